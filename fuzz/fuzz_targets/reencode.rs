#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = hessian2::decode(data) {
        let bytes = hessian2::encode(&value);
        hessian2::decode(&bytes).expect("re-encoded stream must decode");
    }
});
