#![no_main]
use libfuzzer_sys::fuzz_target;
use nifti_sa::{load, Dialect};

fuzz_target!(|data: &[u8]| {
    for &dialect in &[Dialect::None, Dialect::Fsl] {
        let _ = load(data, dialect);
    }
});
