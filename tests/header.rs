use nifti_sa::header::{detect_and_swap_endian, HEADER_FIELDS, MAGIC_CODE_NI1};
use nifti_sa::{read_header, Endianness, NiftiError, NiftiHeader, NiftiType, SliceOrder};
use pretty_assertions::assert_eq;

fn sample_header(endianness: Endianness) -> NiftiHeader {
    let mut h = NiftiHeader {
        dim: [4, 64, 64, 10, 2, 1, 1, 1],
        datatype: NiftiType::Int16 as i16,
        bitpix: 16,
        pixdim: [1., 3., 3., 3., 2000., 0., 0., 0.],
        slice_code: SliceOrder::AltInc as u8,
        slice_duration: 50.,
        xyzt_units: 2 | 16,
        qform_code: 1,
        quatern_b: 0.25,
        qoffset_x: -90.5,
        endianness,
        ..NiftiHeader::default()
    };
    h.set_description(b"ep2d_bold").unwrap();
    h
}

#[test]
fn read_foreign_byte_order() {
    let foreign = Endianness::native().to_opposite();
    let h = sample_header(foreign);
    let bytes = h.to_bytes().unwrap();
    assert_eq!(bytes.len(), 348);

    let read = read_header(&bytes).unwrap();
    assert_eq!(read, h);
    assert_eq!(read.endianness, foreign);
    assert_eq!(read.description_str(), "ep2d_bold");
    assert_eq!(read.slice_order().unwrap(), SliceOrder::AltInc);
}

#[test]
fn swap_detection() {
    let mut bytes = sample_header(Endianness::native().to_opposite())
        .to_bytes()
        .unwrap();
    let original = bytes.clone();
    assert!(detect_and_swap_endian(&mut bytes));
    assert_eq!(&bytes[0..4], &348i32.to_ne_bytes());
    assert!(!detect_and_swap_endian(&mut bytes));

    // swapping the field table twice is the identity
    for field in HEADER_FIELDS.iter() {
        field.swap_in(&mut bytes);
    }
    assert_eq!(bytes, original);
    for field in HEADER_FIELDS.iter() {
        field.swap_in(&mut bytes);
    }
    assert_eq!(read_header(&bytes).unwrap().dim, [4, 64, 64, 10, 2, 1, 1, 1]);
}

#[test]
fn repairs_on_read() {
    let mut h = sample_header(Endianness::native());
    h.vox_offset = 0.;
    h.slice_duration = -1.;
    h.dim = [7, 64, 64, 10, 0, 1, 1, 1];
    let bytes = h.to_bytes().unwrap();

    let read = read_header(&bytes).unwrap();
    assert_eq!(read.vox_offset, 352.);
    assert_eq!(read.slice_duration, 0.);
    assert_eq!(read.dim, [3, 64, 64, 10, 1, 1, 1, 1]);
}

#[test]
fn rejected_headers() {
    let bytes = sample_header(Endianness::native()).to_bytes().unwrap();
    match read_header(&bytes[..200]) {
        Err(NiftiError::TruncatedHeader(200)) => {}
        other => panic!("expected a truncated header, got {:?}", other),
    }

    let mut pair = sample_header(Endianness::native());
    pair.magic = *MAGIC_CODE_NI1;
    match read_header(&pair.to_bytes().unwrap()) {
        Err(NiftiError::InvalidFormat) => {}
        other => panic!("expected an invalid format, got {:?}", other),
    }
}
