// tests/spec_property.rs

//! Property tests for launch-spec parsing.

use proptest::prelude::*;

use redfleet::descriptor::{LaunchSpec, Role};

proptest! {
    #[test]
    fn upstream_presence_matches_role(
        cap in 1u64..1_000_000,
        role_idx in 0usize..3,
        host in "[a-z][a-z0-9.-]{0,20}",
        port in 1u16..u16::MAX,
    ) {
        let (keyword, has_upstream) = match role_idx {
            0 => ("Master", false),
            1 => ("SlaveOf", true),
            _ => ("Master-SlaveOf", true),
        };
        let payload = if has_upstream {
            format!("{cap} {keyword} {host}:{port}")
        } else {
            format!("{cap} {keyword}")
        };

        let spec = LaunchSpec::parse(&payload).unwrap();
        prop_assert_eq!(spec.capacity, cap);
        prop_assert_eq!(spec.replica_of.is_some(), spec.role != Role::Primary);
        if let Some(upstream) = &spec.replica_of {
            prop_assert_eq!(upstream.port, port);
        }
    }

    #[test]
    fn arbitrary_payloads_never_panic(payload in ".{0,64}") {
        let _ = LaunchSpec::parse(&payload);
    }
}
