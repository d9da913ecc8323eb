// ABOUTME: Integration tests for service identities, roles and container ids.
// ABOUTME: Tests parsing, validation, and the serialized forms stored in state.

use clusteradm::types::*;

mod service_id_tests {
    use super::*;

    #[test]
    fn identity_joins_cluster_role_host_and_sequence() {
        let id = ServiceId::new("prod", Role::Chunkserver, "10.0.0.7", 11).unwrap();
        assert_eq!(id.to_string(), "prod_chunkserver_10.0.0.7_11");
    }

    #[test]
    fn stored_identity_compares_equal_to_built_one() {
        let built = ServiceId::new("prod", Role::Etcd, "host1", 0).unwrap();
        assert_eq!(ServiceId::from_stored("prod_etcd_host1_0"), built);
    }

    #[test]
    fn empty_host_returns_error() {
        assert!(matches!(
            ServiceId::new("prod", Role::Mds, "", 0),
            Err(ServiceIdError::EmptyHost)
        ));
    }

    #[test]
    fn quotes_and_whitespace_are_rejected() {
        assert!(ServiceId::new("prod", Role::Mds, "host 1", 0).is_err());
        assert!(ServiceId::new("prod", Role::Mds, "host'1", 0).is_err());
        assert!(ServiceId::new("pr\"od", Role::Mds, "host1", 0).is_err());
    }

    #[test]
    fn separator_in_cluster_names_the_field() {
        let err = ServiceId::new("my_cluster", Role::Etcd, "host1", 0).unwrap_err();
        assert_eq!(err.to_string(), "invalid character in cluster: '_'");
    }
}

mod role_tests {
    use super::*;

    #[test]
    fn roles_deserialize_from_lowercase_names() {
        let roles: Vec<Role> = serde_yaml::from_str("[etcd, mds, snapshotclone]").unwrap();
        assert_eq!(roles, vec![Role::Etcd, Role::Mds, Role::Snapshotclone]);
    }

    #[test]
    fn deploy_order_starts_with_etcd() {
        assert_eq!(Role::ALL[0], Role::Etcd);
        assert!(Role::ALL.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn only_mds_and_snapshotclone_embed_etcd_endpoints() {
        let embedding: Vec<Role> = Role::ALL
            .into_iter()
            .filter(Role::embeds_etcd_endpoints)
            .collect();
        assert_eq!(embedding, vec![Role::Mds, Role::Snapshotclone]);
    }

    #[test]
    fn unknown_role_error_names_the_input() {
        let err = "Etcd".parse::<Role>().unwrap_err();
        assert_eq!(err.to_string(), "unknown service role: Etcd");
    }
}

mod id_tests {
    use super::*;

    #[test]
    fn container_id_stores_value() {
        let id = ContainerId::new("abc123");
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(id.into_inner(), "abc123");
    }

    #[test]
    fn container_id_serializes_as_plain_string() {
        let id = ContainerId::new("c0ffee");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"c0ffee\"");
        let back: ContainerId = serde_json::from_str("\"c0ffee\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn short_form_matches_engine_listing() {
        let id = ContainerId::new("4f1c2a9b7e3d5f6a8b9c0d1e2f3a4b5c");
        assert_eq!(id.short(), "4f1c2a9b7e3d");
    }
}
