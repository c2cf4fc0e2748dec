//! Frame decoding must never panic, and every frame it accepts must encode
//! back to exactly the bytes it consumed.

#![no_main]

use fast_proto::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok((frame, consumed)) = Frame::decode(data) else {
        return;
    };

    assert!(consumed <= data.len());
    let encoded = frame.to_bytes().expect("decoded frame must encode");
    assert_eq!(&encoded[..], &data[..consumed]);
});
