//! Fuzz target: `Command::decode` → router → queue
//!
//! Drives arbitrary control-topic payloads through the router and asserts
//! that decoding never panics, every payload queues exactly one action,
//! and unknown text is echoed back trimmed.
//!
//! cargo fuzz run fuzz_command_decode

#![no_main]

use std::sync::Arc;

use beltctl::app::commands::Command;
use beltctl::app::router::{ActionQueue, CommandRouter};
use beltctl::config::Topics;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let command = Command::decode(data);
    if let Command::Unknown(raw) = &command {
        assert_eq!(raw.trim(), raw, "unknown text must be trimmed");
        assert!(command.status().to_string().starts_with("unknown command: "));
    }

    let topics = Topics::default();
    let queue = Arc::new(ActionQueue::new());
    let router = CommandRouter::new(&topics, Arc::clone(&queue));
    assert_eq!(router.route(&topics.control, data), Ok(Some(command)));
    assert_eq!(queue.len(), 1);
});
