#![no_main]
use libfuzzer_sys::fuzz_target;
use sendq_core::Message;

fuzz_target!(|data: &[u8]| {
    let message = Message::parse(data);
    assert!(!message.headers().windows(2).any(|w| w == b"\n\n"));
    assert!(message.headers().len() + message.body().len() <= data.len());
});
