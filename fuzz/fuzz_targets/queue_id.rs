#![no_main]
use libfuzzer_sys::fuzz_target;
use sendq_common::{QueueId, QueueIdTemplate, SEQUENCE_SPACE};

fuzz_target!(|input: (i64, u32, u16)| {
    let (timestamp, pid, sequence) = input;
    if let Ok(template) = QueueIdTemplate::generate(timestamp, pid) {
        let queue_id = template.fill(sequence % SEQUENCE_SPACE);
        assert_eq!(queue_id.as_str().len(), QueueId::LEN);
        assert_eq!(queue_id.sequence(), sequence % SEQUENCE_SPACE);
        assert_eq!(queue_id.as_str().parse::<QueueId>().ok(), Some(queue_id));
    }
});
