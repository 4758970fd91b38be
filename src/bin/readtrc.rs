//! Prints the content of a TRC file.

use std::{env, process};
use std::path::Path;
use cppki::renewal::load_trc;
use cppki::x509::Time;


fn main() {
    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            println!("Usage: readtrc <path>");
            return
        }
    };
    let trc = match load_trc(Path::new(&path)) {
        Ok(trc) => trc,
        Err(err) => {
            println!("Can’t load TRC: {}", err);
            process::exit(1);
        }
    };

    println!("TRC:          {}", trc.id());
    println!("Validity:     {}", trc.validity());
    println!("Grace period: {}s", trc.grace_period().num_seconds());
    println!("In grace:     {}", trc.in_grace_period(Time::now()));
    println!("Description:  {}", trc.description());
    println!("Voting quorum: {}", trc.voting_quorum());
    for asn in trc.core_ases() {
        println!("Core AS:      {}", asn);
    }
    for asn in trc.authoritative_ases() {
        println!("Auth. AS:     {}", asn);
    }
    for cert in trc.certificates() {
        let cert_type = match cert.cert_type() {
            Ok(cert_type) => cert_type.to_string(),
            Err(_) => "invalid".into(),
        };
        println!(
            "Certificate:  {} {} (serial {})",
            cert_type, cert.subject(), cert.serial_number()
        );
    }
}
