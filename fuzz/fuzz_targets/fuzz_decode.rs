#![no_main]
use dci_rs::Archive;
use libfuzzer_sys::fuzz_target;

// Any input must decode or fail cleanly; whatever decodes must re-encode
// to an image that decodes to the same bytes again.
fuzz_target!(|data: &[u8]| {
    let archive = match Archive::from_bytes(data.to_vec()) {
        Ok(a) => a,
        Err(_) => return,
    };

    let bytes = archive.to_bytes().expect("decoded archive must encode");
    assert_eq!(bytes.len() as u64, archive.encoded_len());

    let again = Archive::from_bytes(bytes.clone()).expect("re-encoded archive must decode");
    assert_eq!(again.to_bytes().expect("encode"), bytes);
});
