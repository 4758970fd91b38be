//! Prints the content of a PEM chain file.
//!
//! If TRC files are given as further arguments, the chain is verified
//! against them.

use std::{env, fs, process};
use std::path::Path;
use cppki::cert::Cert;
use cppki::chain::Chain;
use cppki::renewal::load_trcs;
use cppki::x509::Time;


fn print_cert(label: &str, cert: &Cert) {
    println!("{}:", label);
    match cert.cert_type() {
        Ok(cert_type) => println!("  Type:     {}", cert_type),
        Err(err) => println!("  Type:     invalid ({})", err),
    }
    println!("  Subject:  {}", cert.subject());
    println!("  Issuer:   {}", cert.issuer());
    println!("  Serial:   {}", cert.serial_number());
    println!("  Validity: {}", cert.validity());
    if let Some(key_id) = cert.subject_key_identifier() {
        println!("  Key ID:   {}", key_id);
    }
}

fn main() {
    let mut args = env::args().skip(1);
    let path = match args.next() {
        Some(path) => path,
        None => {
            println!("Usage: readchain <chain.pem> [<trc>...]");
            return
        }
    };
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) => {
            println!("Can’t read file: {}", err);
            process::exit(1);
        }
    };
    let chain = match Chain::from_pem(&text) {
        Ok(chain) => chain,
        Err(err) => {
            println!("Can’t decode chain: {}", err);
            process::exit(1);
        }
    };
    print_cert("AS certificate", chain.as_cert());
    print_cert("CA certificate", chain.ca_cert());

    let trc_paths: Vec<String> = args.collect();
    if trc_paths.is_empty() {
        return
    }
    let trcs = match load_trcs(trc_paths.iter().map(Path::new)) {
        Ok(trcs) => trcs,
        Err(err) => {
            println!("Can’t load TRC: {}", err);
            process::exit(1);
        }
    };
    match chain.verify(&trcs, Time::now()) {
        Ok(ia) => println!("Chain verified for {}", ia),
        Err(err) => {
            println!("Verification failed: {}", err);
            process::exit(1);
        }
    }
}
