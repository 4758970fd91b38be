//! A small PKI written to a temporary directory.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::TimeDelta;
use cppki::cert::{Cert, CertProfile, TbsCert};
use cppki::chain::Chain;
use cppki::crypto::{PublicKeyFormat, Signer};
use cppki::crypto::softsigner::{KeyId, OpenSslSigner};
use cppki::ia::{Ia, Isd};
use cppki::oid;
use cppki::pem;
use cppki::trc::{Trc, TrcId};
use cppki::x509::{Name, Serial, Time, Validity};


pub fn now() -> Time {
    Time::now().trunc()
}

pub fn ia(s: &str) -> Ia {
    s.parse().unwrap()
}

pub fn name(ia: Ia, common_name: &str) -> Name {
    let ia = ia.to_string();
    Name::from_attributes([
        (oid::AT_COMMON_NAME, common_name),
        (oid::AT_ISD_AS, ia.as_str()),
    ])
}


//------------ Pki -----------------------------------------------------------

/// A root and a CA certificate of ISD 1.
pub struct Pki {
    pub signer: Arc<OpenSslSigner>,
    pub root: Cert,
    pub ca_key: KeyId,
    pub ca: Cert,
}

impl Pki {
    pub fn new(signer: Arc<OpenSslSigner>, ca_ia: Ia, now: Time) -> Self {
        let start = now - TimeDelta::hours(1);
        let root_key = signer.create_key(PublicKeyFormat::EcdsaP384).unwrap();
        let root_name = name(ca_ia, "Root");
        let root = TbsCert::new(
            CertProfile::Root,
            Serial::random(&signer).unwrap(),
            root_name.clone(),
            Validity::from_duration(
                start, TimeDelta::days(365)
            ).unwrap(),
            root_name,
            signer.get_key_info(&root_key).unwrap(),
        ).into_cert(&signer, &root_key).unwrap();

        let ca_key = signer.create_key(PublicKeyFormat::EcdsaP256).unwrap();
        let mut ca = TbsCert::new(
            CertProfile::Ca,
            Serial::random(&signer).unwrap(),
            root.subject().clone(),
            Validity::from_duration(
                start, TimeDelta::days(100)
            ).unwrap(),
            name(ca_ia, "CA"),
            signer.get_key_info(&ca_key).unwrap(),
        );
        ca.set_authority_key_identifier(root.subject_key_identifier());
        let ca = ca.into_cert(&signer, &root_key).unwrap();
        Pki { signer, root, ca_key, ca }
    }

    /// Returns a TRC containing the root certificate.
    pub fn trc(&self, serial: u64, grace: TimeDelta) -> Trc {
        let mut trc = Trc::new(
            TrcId::new(Isd::from_u16(1), 1, serial),
            self.root.validity(),
            vec![self.root.clone()],
        );
        trc.set_grace_period(grace);
        trc
    }

    /// Issues a chain for a new key.
    pub fn issue(&self, ia: Ia) -> (KeyId, Chain) {
        let key = self.signer.create_key(PublicKeyFormat::EcdsaP256).unwrap();
        let mut tbs = TbsCert::new(
            CertProfile::As,
            Serial::random(&self.signer).unwrap(),
            self.ca.subject().clone(),
            Validity::from_duration(
                self.ca.validity().not_before(), TimeDelta::days(3)
            ).unwrap(),
            name(ia, "AS Certificate"),
            self.signer.get_key_info(&key).unwrap(),
        );
        tbs.set_authority_key_identifier(self.ca.subject_key_identifier());
        let cert = tbs.into_cert(&self.signer, &self.ca_key).unwrap();
        (key, Chain::new(cert, self.ca.clone()).unwrap())
    }
}


//------------ Writing Files -------------------------------------------------

pub fn write_trc(dir: &Path, trc: &Trc) -> PathBuf {
    let path = dir.join(format!(
        "ISD{}-B{}-S{}.trc",
        trc.id().isd(), trc.id().base(), trc.id().serial()
    ));
    fs::write(&path, trc.to_captured().as_slice()).unwrap();
    path
}

pub fn write_cert(dir: &Path, file: &str, cert: &Cert) -> PathBuf {
    let path = dir.join(file);
    fs::write(
        &path, pem::encode(pem::CERTIFICATE, cert.to_captured().as_slice())
    ).unwrap();
    path
}

pub fn write_chain(dir: &Path, file: &str, chain: &Chain) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, chain.to_pem()).unwrap();
    path
}

pub fn write_key(
    dir: &Path, file: &str, signer: &OpenSslSigner, key: KeyId
) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, signer.key_to_pem(&key).unwrap()).unwrap();
    path
}

pub fn new_key(dir: &Path, file: &str, signer: &OpenSslSigner) -> PathBuf {
    let key = signer.create_key(PublicKeyFormat::EcdsaP256).unwrap();
    write_key(dir, file, signer, key)
}
