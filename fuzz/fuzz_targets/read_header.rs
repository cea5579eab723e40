#![no_main]
use libfuzzer_sys::fuzz_target;
use nifti_sa::read_header;

fuzz_target!(|data: &[u8]| {
    let _ = read_header(data);
});
