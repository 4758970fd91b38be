//! Renewing chains against a server on localhost.

mod common;

use std::fs;
use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use chrono::TimeDelta;
use cppki::chain::Chain;
use cppki::crypto::softsigner::OpenSslSigner;
use cppki::ia::Ia;
use cppki::renewal::client::{GraceGuidance, RenewalClient, RenewalError};
use cppki::renewal::config::{Features, RenewalConfig, ServerConfig};
use cppki::renewal::server::RenewalServer;
use cppki::transport::{
    read_frame, serve, write_frame, TcpTransport, Transport, TransportError,
};
use cppki::x509::Time;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, Instant};
use common::Pki;


const AS_IA: &str = "1-ff00:0:110";
const CA_IA: &str = "1-ff00:0:111";

/// The files of a requester and a running server.
struct Setup {
    _dir: tempfile::TempDir,
    config: RenewalConfig,
    transport: TcpTransport,
}

/// Starts a server and prepares the files of a requester.
///
/// The server issues with `server_pki`, the requester’s chain and TRC come
/// from `client_pki`.
async fn setup(
    requester: &str, client_pki: &Pki, server_pki: &Pki, grace: TimeDelta,
) -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path();
    let signer = &client_pki.signer;

    let trc = common::write_trc(path, &client_pki.trc(2, grace));
    let (server_key, server_chain) = client_pki.issue(common::ia(CA_IA));
    let server_config = ServerConfig::from_str(&format!(
        r#"
            listen = "127.0.0.1:0"
            trcs = ["{}"]
            ca_cert = "{}"
            ca_key = "{}"
            chain = "{}"
            key = "{}"
        "#,
        trc.display(),
        common::write_cert(path, "ca.pem", &server_pki.ca).display(),
        common::write_key(
            path, "ca.key", &server_pki.signer, server_pki.ca_key
        ).display(),
        common::write_chain(path, "server.pem", &server_chain).display(),
        common::write_key(path, "server.key", signer, server_key).display(),
    )).unwrap();
    let server = RenewalServer::from_config(
        &server_config, common::now()
    ).unwrap();
    let listener = TcpListener::bind(server_config.listen).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, Arc::new(server)));

    let (key, chain) = if requester == CA_IA {
        (server_key, server_chain)
    }
    else {
        client_pki.issue(common::ia(requester))
    };
    let mut config = RenewalConfig::new(
        vec![trc],
        common::write_chain(path, "old.pem", &chain),
        common::write_key(path, "old.key", signer, key),
        common::new_key(path, "new.key", signer),
    );
    config.remotes.insert(common::ia(CA_IA), addr);
    let transport = TcpTransport::new(config.remotes.clone());
    Setup { _dir: dir, config, transport }
}

/// A transport that takes its time to connect.
struct SlowDial {
    inner: TcpTransport,
    delay: Duration,
}

impl Transport for SlowDial {
    type Conn = TcpStream;

    fn dial(
        &self, remote: Ia, local: Option<SocketAddr>
    ) -> impl Future<Output = Result<TcpStream, TransportError>> + Send {
        let dial = self.inner.dial(remote, local);
        let delay = self.delay;
        async move {
            sleep(delay).await;
            dial.await
        }
    }
}

/// Starts a proxy to `target` that holds back each reply for `delay`.
async fn slow_reply(target: SocketAddr, delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                let request = read_frame(&mut sock).await.unwrap();
                let mut upstream = TcpStream::connect(target).await.unwrap();
                write_frame(&mut upstream, &request).await.unwrap();
                let reply = read_frame(&mut upstream).await.unwrap();
                sleep(delay).await;
                let _ = write_frame(&mut sock, &reply).await;
            });
        }
    });
    addr
}

/// Routes the requester through a slow dial and a slow reply.
async fn slow_client(
    mut setup: Setup, dial: Duration, reply: Duration
) -> (RenewalClient<SlowDial>, tempfile::TempDir) {
    let server = setup.config.remotes[&common::ia(CA_IA)];
    let proxy = slow_reply(server, reply).await;
    setup.config.remotes.insert(common::ia(CA_IA), proxy);
    let transport = SlowDial {
        inner: TcpTransport::new(setup.config.remotes.clone()),
        delay: dial,
    };
    (
        RenewalClient::new(
            setup.config, transport, Arc::new(OpenSslSigner::new())
        ),
        setup._dir,
    )
}

fn client(setup: Setup) -> (RenewalClient<TcpTransport>, tempfile::TempDir) {
    (
        RenewalClient::new(
            setup.config, setup.transport, Arc::new(OpenSslSigner::new())
        ),
        setup._dir,
    )
}

#[tokio::test]
async fn renew_cms_and_legacy() {
    let now = common::now();
    let pki = Pki::new(Arc::new(OpenSslSigner::new()), common::ia(CA_IA), now);
    let setup = setup(AS_IA, &pki, &pki, TimeDelta::zero()).await;
    let csr_out = setup._dir.path().join("new.csr");
    let mut config = setup.config.clone();
    config.csr_out = Some(csr_out.clone());
    let (client, dir) = client(Setup { config, ..setup });

    let report = client.renew(Time::now()).await.unwrap();
    assert_eq!(report.remote, common::ia(CA_IA));
    assert_eq!(report.chain.as_ia(), common::ia(AS_IA));
    assert_eq!(
        report.path,
        dir.path().join(format!(
            "ISD1-ASff00_0_110.{}.pem",
            report.chain.as_cert().serial_number().to_hex()
        ))
    );
    let written = Chain::from_pem(
        &fs::read_to_string(&report.path).unwrap()
    ).unwrap();
    assert_eq!(written, report.chain);
    assert!(fs::read_to_string(csr_out).unwrap().starts_with(
        "-----BEGIN CERTIFICATE REQUEST-----"
    ));
}

#[tokio::test]
async fn renew_legacy_only() {
    let now = common::now();
    let pki = Pki::new(Arc::new(OpenSslSigner::new()), common::ia(CA_IA), now);
    let mut setup = setup(CA_IA, &pki, &pki, TimeDelta::zero()).await;
    setup.config.features = Features::parse(["disable_cms_request"]).unwrap();
    let out = setup._dir.path().join("renewed.pem");
    setup.config.out = Some(out.clone());
    let (client, _dir) = client(setup);

    let report = client.renew(Time::now()).await.unwrap();
    assert_eq!(report.path, out);
    assert_eq!(report.chain.as_ia(), common::ia(CA_IA));
    assert!(out.exists());
}

#[tokio::test]
async fn verification_failure_in_grace() {
    let now = common::now();
    let signer = Arc::new(OpenSslSigner::new());
    let client_pki = Pki::new(signer.clone(), common::ia(CA_IA), now);
    let server_pki = Pki::new(signer, common::ia(CA_IA), now);
    let setup = setup(
        AS_IA, &client_pki, &server_pki, TimeDelta::days(1)
    ).await;
    let out = setup._dir.path().join("renewed.pem");
    let mut config = setup.config.clone();
    config.out = Some(out.clone());
    let (client, _dir) = client(Setup { config, ..setup });

    match client.renew(Time::now()).await {
        Err(RenewalError::Verification { path, guidance, source }) => {
            assert_eq!(path, out.with_extension("pem.unverified"));
            assert!(path.exists());
            assert!(!out.exists());
            assert_eq!(guidance, Some(GraceGuidance { base: 1, serial: 1 }));
            assert!(!source.errors().is_empty());
        }
        res => panic!("unexpected result {:?}", res.map(|r| r.path)),
    }
}

#[tokio::test]
async fn slow_exchange_verifies_at_arrival() {
    let now = common::now();
    let pki = Pki::new(Arc::new(OpenSslSigner::new()), common::ia(CA_IA), now);
    let mut setup = setup(AS_IA, &pki, &pki, TimeDelta::zero()).await;
    setup.config.timeout_secs = 5;
    let (client, _dir) = slow_client(
        setup, Duration::from_millis(700), Duration::from_millis(700)
    ).await;

    let report = client.renew(Time::now()).await.unwrap();
    assert_eq!(report.chain.as_ia(), common::ia(AS_IA));
    assert!(report.path.exists());
}

#[tokio::test]
async fn timeout_covers_dial_and_reply() {
    let now = common::now();
    let pki = Pki::new(Arc::new(OpenSslSigner::new()), common::ia(CA_IA), now);
    let mut setup = setup(AS_IA, &pki, &pki, TimeDelta::zero()).await;
    setup.config.timeout_secs = 1;
    let (client, _dir) = slow_client(
        setup, Duration::from_millis(800), Duration::from_millis(800)
    ).await;

    let started = Instant::now();
    assert!(matches!(
        client.renew(Time::now()).await,
        Err(RenewalError::Transport(TransportError::Timeout))
    ));
    assert!(started.elapsed() < Duration::from_millis(1500));
}

#[tokio::test]
async fn unwritable_request_file() {
    let now = common::now();
    let pki = Pki::new(Arc::new(OpenSslSigner::new()), common::ia(CA_IA), now);
    let mut setup = setup(AS_IA, &pki, &pki, TimeDelta::zero()).await;
    let req_out = setup._dir.path().join("no/such/dir/req.pem");
    setup.config.req_out = Some(req_out.clone());
    let (client, _dir) = client(setup);

    let report = client.renew(Time::now()).await.unwrap();
    assert!(report.path.exists());
    assert!(!req_out.exists());
}

#[tokio::test]
async fn transport_chain_in_grace() {
    let now = common::now();
    let signer = Arc::new(OpenSslSigner::new());
    let pki = Pki::new(signer.clone(), common::ia(CA_IA), now);
    let other = Pki::new(signer.clone(), common::ia(CA_IA), now);
    let mut setup = setup(AS_IA, &pki, &pki, TimeDelta::days(1)).await;
    let (_, chain) = other.issue(common::ia(AS_IA));
    setup.config.transport_cert = common::write_chain(
        setup._dir.path(), "foreign.pem", &chain
    );
    let (client, _dir) = client(setup);

    match client.renew(Time::now()).await {
        Err(RenewalError::TransportChain { guidance, source }) => {
            assert_eq!(guidance, Some(GraceGuidance { base: 1, serial: 1 }));
            assert!(!source.errors().is_empty());
        }
        res => panic!("unexpected result {:?}", res.map(|r| r.path)),
    }
}

#[tokio::test]
async fn cancelled() {
    let now = common::now();
    let pki = Pki::new(Arc::new(OpenSslSigner::new()), common::ia(CA_IA), now);
    let setup = setup(AS_IA, &pki, &pki, TimeDelta::zero()).await;
    let (client, _dir) = client(setup);
    assert!(matches!(
        client.renew_with_cancel(Time::now(), async { }).await,
        Err(RenewalError::Transport(TransportError::Cancelled))
    ));
}

#[tokio::test]
async fn timeout() {
    let now = common::now();
    let pki = Pki::new(Arc::new(OpenSslSigner::new()), common::ia(CA_IA), now);
    let mut setup = setup(AS_IA, &pki, &pki, TimeDelta::zero()).await;

    // A server that accepts but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut socks = Vec::new();
        while let Ok((sock, _)) = listener.accept().await {
            socks.push(sock)
        }
    });
    setup.config.remotes.insert(common::ia(CA_IA), addr);
    setup.transport = TcpTransport::new(setup.config.remotes.clone());
    setup.config.timeout_secs = 1;
    let (client, _dir) = client(setup);
    assert!(matches!(
        client.renew(Time::now()).await,
        Err(RenewalError::Transport(TransportError::Timeout))
    ));
}

#[tokio::test]
async fn both_encodings_disabled() {
    let now = common::now();
    let pki = Pki::new(Arc::new(OpenSslSigner::new()), common::ia(CA_IA), now);
    let mut setup = setup(AS_IA, &pki, &pki, TimeDelta::zero()).await;
    setup.config.features.disable_cms_request = true;
    setup.config.features.disable_legacy_request = true;
    let (client, _dir) = client(setup);
    assert!(matches!(
        client.renew(Time::now()).await,
        Err(RenewalError::Config(_))
    ));
}
