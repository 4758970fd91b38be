#![no_main]

use libfuzzer_sys::fuzz_target;
use cppki::cert::Cert;
use cppki::chain::Chain;
use cppki::csr::Csr;
use cppki::renewal::{cms, legacy, msg};
use cppki::trc::Trc;

fuzz_target!(|data: &[u8]| {
    let (which, data) = match data.split_first() {
        Some((first, data)) => (*first, data),
        None => return,
    };

    match which % 9 {
        0 => { let _ = Cert::decode(data); },
        1 => { let _ = Csr::decode(data); },
        2 => { let _ = Trc::decode(data); },
        3 => { let _ = Chain::from_der(data); },
        4 => { let _ = cms::SignedMessage::decode(data); },
        5 => { let _ = legacy::SignedMessage::decode(data); },
        6 => { let _ = msg::ChainRenewalRequest::decode(data); },
        7 => { let _ = msg::ChainRenewalResponse::decode(data); },
        8 => { let _ = msg::decode_legacy_chain(data); },
        _ => panic!("what?"),
    }
});
