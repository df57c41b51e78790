//! Event application on the instance-side directory mirror.
//!
//! Application is idempotent and tolerant of missing prerequisites so the
//! snapshot can interleave with live events on reconnect: an unknown owner
//! is created implicitly, a remove of something absent is ignored, and a
//! duplicate create is a no-op. Anything that still cannot be applied
//! leaves the mirror untrustworthy and is fatal to the instance.

use log::{debug, warn};

use roster_types::Directory;

use crate::error::NetError;
use crate::protocol::{Message, MessageType};

/// Apply one broadcast event to the mirror.
pub fn apply_event(dir: &mut Directory, msg: &Message) -> Result<(), NetError> {
    match msg.kind {
        MessageType::EventNewUser => {
            let name = msg.get("name");
            if dir.user(name).is_ok() {
                return Ok(());
            }
            dir.new_user(name).map_err(|e| inconsistent(msg, &e))
        }
        MessageType::EventNewGroup => {
            let name = msg.get("name");
            if dir.group(name).is_ok() {
                return Ok(());
            }
            ensure_owner(dir, msg)?;
            dir.new_group(name, msg.get("owner"))
                .map_err(|e| inconsistent(msg, &e))
        }
        MessageType::EventNewEndpoint => {
            let name = msg.get("name");
            if dir.endpoint(name).is_ok() {
                return Ok(());
            }
            ensure_owner(dir, msg)?;
            dir.new_endpoint(name, msg.get("owner"))
                .map_err(|e| inconsistent(msg, &e))
        }
        MessageType::EventRemoveEndpoint => {
            ignore_absent(dir.remove_endpoint(msg.get("name")), msg);
            Ok(())
        }
        MessageType::EventRemoveGroup => {
            ignore_absent(dir.remove_group(msg.get("name")), msg);
            Ok(())
        }
        MessageType::EventRemoveUser => {
            ignore_absent(dir.remove_user(msg.get("name")), msg);
            Ok(())
        }
        MessageType::EventEndpointOnline | MessageType::EventEndpointOffline => {
            let online = msg.kind == MessageType::EventEndpointOnline;
            match dir.endpoint_mut(msg.get("name")) {
                Ok(endpoint) => endpoint.set_connected(online),
                Err(_) => debug!("online/offline for unknown endpoint {}", msg.get("name")),
            }
            Ok(())
        }
        MessageType::EventGroupGroupJoin => dir
            .group_add_group(msg.get("group"), msg.get("target"))
            .map(|_| ())
            .map_err(|e| inconsistent(msg, &e)),
        MessageType::EventGroupGroupLeave => {
            ignore_absent(dir.group_remove_group(msg.get("group"), msg.get("target")), msg);
            Ok(())
        }
        MessageType::EventGroupEndpointJoin => dir
            .group_add_endpoint(msg.get("group"), endpoint_key(msg))
            .map(|_| ())
            .map_err(|e| inconsistent(msg, &e)),
        MessageType::EventGroupEndpointLeave => {
            ignore_absent(dir.group_remove_endpoint(msg.get("group"), endpoint_key(msg)), msg);
            Ok(())
        }
        other => {
            warn!("replica: ignoring non-event message {:?}", other);
            Ok(())
        }
    }
}

/// Implicitly create the owner user named by an event, if unknown.
fn ensure_owner(dir: &mut Directory, msg: &Message) -> Result<(), NetError> {
    let owner = msg.get("owner");
    if dir.user(owner).is_ok() {
        return Ok(());
    }
    dir.new_user(owner).map_err(|e| inconsistent(msg, &e))
}

/// Group-endpoint events historically carried the member under "target";
/// current brokers send "endpoint". Accept both.
fn endpoint_key(msg: &Message) -> &str {
    let endpoint = msg.get("endpoint");
    if endpoint.is_empty() {
        msg.get("target")
    } else {
        endpoint
    }
}

/// Removes and leaves tolerate absent entities.
fn ignore_absent<T, E>(result: Result<T, E>, msg: &Message) {
    if result.is_err() {
        debug!("replica: ignoring {:?} for absent entity", msg.kind);
    }
}

fn inconsistent(msg: &Message, err: &dyn std::fmt::Display) -> NetError {
    NetError::ReplicaInconsistent(format!("{:?}: {}", msg.kind, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: MessageType, fields: &[(&str, &str)]) -> Message {
        let mut msg = Message::event(kind);
        for (k, v) in fields {
            msg.set(k, v);
        }
        msg
    }

    #[test]
    fn new_endpoint_creates_unknown_owner_implicitly() {
        let mut dir = Directory::new();
        apply_event(
            &mut dir,
            &event(
                MessageType::EventNewEndpoint,
                &[("name", "box1"), ("owner", "alice")],
            ),
        )
        .unwrap();
        assert!(dir.user("alice").is_ok());
        assert_eq!(dir.endpoint("box1").unwrap().owner(), "alice");
        // The implicit personal group picked the endpoint up too.
        assert!(dir.group("alice").unwrap().has_endpoint("box1"));
    }

    #[test]
    fn duplicate_creates_are_noops() {
        let mut dir = Directory::new();
        let ev = event(MessageType::EventNewUser, &[("name", "alice")]);
        apply_event(&mut dir, &ev).unwrap();
        apply_event(&mut dir, &ev).unwrap();
        assert_eq!(dir.users().count(), 1);

        let ev = event(
            MessageType::EventNewGroup,
            &[("name", "ops"), ("owner", "alice")],
        );
        apply_event(&mut dir, &ev).unwrap();
        apply_event(&mut dir, &ev).unwrap();
    }

    #[test]
    fn removes_of_absent_entities_are_ignored() {
        let mut dir = Directory::new();
        for kind in [
            MessageType::EventRemoveEndpoint,
            MessageType::EventRemoveGroup,
            MessageType::EventRemoveUser,
        ] {
            apply_event(&mut dir, &event(kind, &[("name", "ghost")])).unwrap();
        }
    }

    #[test]
    fn online_offline_toggle_connected() {
        let mut dir = Directory::new();
        dir.new_user("alice").unwrap();
        dir.new_endpoint("box1", "alice").unwrap();

        apply_event(
            &mut dir,
            &event(MessageType::EventEndpointOnline, &[("name", "box1")]),
        )
        .unwrap();
        assert!(dir.endpoint("box1").unwrap().connected());

        apply_event(
            &mut dir,
            &event(MessageType::EventEndpointOffline, &[("name", "box1")]),
        )
        .unwrap();
        assert!(!dir.endpoint("box1").unwrap().connected());

        // Unknown endpoints are skipped, not fatal.
        apply_event(
            &mut dir,
            &event(MessageType::EventEndpointOnline, &[("name", "ghost")]),
        )
        .unwrap();
    }

    #[test]
    fn group_endpoint_join_accepts_both_keys() {
        let mut dir = Directory::new();
        dir.new_user("alice").unwrap();
        dir.new_group("ops", "alice").unwrap();
        dir.new_group("eng", "alice").unwrap();
        dir.new_endpoint("box1", "alice").unwrap();

        apply_event(
            &mut dir,
            &event(
                MessageType::EventGroupEndpointJoin,
                &[("group", "ops"), ("endpoint", "box1")],
            ),
        )
        .unwrap();
        assert!(dir.group("ops").unwrap().has_endpoint("box1"));

        // Legacy emitters used "target" for the same field.
        apply_event(
            &mut dir,
            &event(
                MessageType::EventGroupEndpointJoin,
                &[("group", "eng"), ("target", "box1")],
            ),
        )
        .unwrap();
        assert!(dir.group("eng").unwrap().has_endpoint("box1"));
    }

    #[test]
    fn join_with_unknown_group_is_fatal() {
        let mut dir = Directory::new();
        dir.new_user("alice").unwrap();
        dir.new_endpoint("box1", "alice").unwrap();
        let result = apply_event(
            &mut dir,
            &event(
                MessageType::EventGroupEndpointJoin,
                &[("group", "ghost"), ("endpoint", "box1")],
            ),
        );
        assert!(matches!(result, Err(NetError::ReplicaInconsistent(_))));
    }

    #[test]
    fn remove_user_sweeps_owned_entities() {
        let mut dir = Directory::new();
        apply_event(
            &mut dir,
            &event(
                MessageType::EventNewEndpoint,
                &[("name", "box1"), ("owner", "alice")],
            ),
        )
        .unwrap();
        apply_event(&mut dir, &event(MessageType::EventRemoveUser, &[("name", "alice")]))
            .unwrap();
        assert!(dir.user("alice").is_err());
        assert!(dir.endpoint("box1").is_err());
    }
}
