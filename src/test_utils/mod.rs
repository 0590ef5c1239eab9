//! the test_utils folder here will share utils or test components between
//! unit tests and integration tests

use crate::keys::ResourceIdentity;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    env_logger::init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// 8-byte big-endian counter payload used by update tests
pub(crate) fn counter_payload(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub(crate) fn read_counter(payload: &[u8]) -> u64 {
    let mut buffer = [0u8; 8];
    buffer.copy_from_slice(&payload[..8]);
    u64::from_be_bytes(buffer)
}

pub(crate) fn widget(
    account_id: &str,
    namespace: &str,
    name: &str,
) -> ResourceIdentity {
    ResourceIdentity::namespaced(account_id, namespace, name)
}
