mod common;

use roster_net::{Instance, NetError};

#[test]
fn test_token_lifecycle_across_connections() {
    let (addr, state) = common::start_broker();
    common::seed_user(&state, "alice", "hunter2");

    // Full login mints a token.
    let mut first = Instance::connect(&addr, false).unwrap();
    first.login("alice", "hunter2").unwrap();
    let token = first.new_auth_token().unwrap();
    assert!(!token.is_empty());

    // A second connection authenticates with it.
    let mut second = Instance::connect(&addr, false).unwrap();
    second.auth(&token).unwrap();
    second.identify("tokenbox").unwrap();
    assert_eq!(
        state
            .lock()
            .unwrap()
            .directory()
            .endpoint("tokenbox")
            .unwrap()
            .owner(),
        "alice"
    );

    // The original connection revokes it; a third connection is refused.
    first.delete_auth_token(&token).unwrap();
    let mut third = Instance::connect(&addr, false).unwrap();
    match third.auth(&token) {
        Err(NetError::Rejected(msg)) => assert_eq!(msg, "Invalid token"),
        other => panic!("expected rejection, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_token_sessions_cannot_manage_tokens() {
    let (addr, state) = common::start_broker();
    common::seed_user(&state, "alice", "hunter2");

    let mut full = Instance::connect(&addr, false).unwrap();
    full.login("alice", "hunter2").unwrap();
    let token = full.new_auth_token().unwrap();

    let mut tokened = Instance::connect(&addr, false).unwrap();
    tokened.auth(&token).unwrap();
    match tokened.new_auth_token() {
        Err(NetError::Rejected(msg)) => assert_eq!(msg, "Method requires full login"),
        other => panic!("expected rejection, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_logoff_downgrades_token_rights() {
    let (addr, state) = common::start_broker();
    common::seed_user(&state, "alice", "hunter2");

    let mut instance = Instance::connect(&addr, false).unwrap();
    instance.login("alice", "hunter2").unwrap();
    instance.logoff().unwrap();

    // Still authenticated: identify works.
    instance.identify("box1").unwrap();

    // But token management requires full login again.
    match instance.new_auth_token() {
        Err(NetError::Rejected(msg)) => assert_eq!(msg, "Method requires full login"),
        other => panic!("expected rejection, got {:?}", other.map(|_| ())),
    }
}
