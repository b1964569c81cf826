//! Deep merge of per-hop results into the running record.
//!
//! Later hops are more specific than earlier ones, so incoming values win,
//! with two exceptions: an empty incoming value never erases data, and
//! name-server lists are swapped out as a whole instead of being unioned.

use super::record::{Field, FieldMap, RegistryInfo};

/// Key under which every handler stores name servers.
pub const NAMESERVER_KEY: &str = "nserver";

pub fn merge(mut base: FieldMap, incoming: FieldMap) -> FieldMap {
    for (key, value) in incoming {
        let merged = match base.remove(&key) {
            None => value,
            Some(existing) => merge_field(&key, existing, value),
        };
        base.insert(key, merged);
    }
    base
}

fn merge_field(key: &str, existing: Field, incoming: Field) -> Field {
    match (existing, incoming) {
        (existing, incoming) if key == NAMESERVER_KEY => {
            if incoming.is_empty() {
                existing
            } else {
                incoming
            }
        }
        (Field::Map(a), Field::Map(b)) => Field::Map(merge(a, b)),
        (existing, Field::Text(value)) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                existing
            } else {
                Field::Text(trimmed.to_string())
            }
        }
        (existing, incoming) => {
            if incoming.is_empty() {
                existing
            } else {
                incoming
            }
        }
    }
}

/// Merge registry metadata. The server history is always appended.
pub fn merge_registry_info(base: &mut RegistryInfo, incoming: RegistryInfo) {
    base.servers.extend(incoming.servers);

    if incoming.kind.is_some() {
        base.kind = incoming.kind;
    }
    if let Some(registrar) = non_empty(incoming.registrar) {
        base.registrar = Some(registrar);
    }
    if let Some(referrer) = non_empty(incoming.referrer) {
        base.referrer = Some(referrer);
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whois::record::ServerHop;

    fn text(s: &str) -> Field {
        Field::text(s)
    }

    fn list(items: &[&str]) -> Field {
        Field::List(items.iter().map(|s| s.to_string()).collect())
    }

    fn map(entries: Vec<(&str, Field)>) -> FieldMap {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn hop(server: &str) -> ServerHop {
        ServerHop {
            server: server.to_string(),
            args: "q".to_string(),
            port: 43,
        }
    }

    #[test]
    fn test_new_keys_are_copied() {
        let merged = merge(
            map(vec![("status", text("active"))]),
            map(vec![("name", text("example.com"))]),
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["name"], text("example.com"));
    }

    #[test]
    fn test_empty_scalar_never_erases() {
        let merged = merge(
            map(vec![("status", text("active"))]),
            map(vec![("status", text("   "))]),
        );
        assert_eq!(merged["status"], text("active"));
    }

    #[test]
    fn test_non_empty_scalar_overwrites() {
        let merged = merge(
            map(vec![("status", text("active"))]),
            map(vec![("status", text(" clientHold "))]),
        );
        assert_eq!(merged["status"], text("clientHold"));
    }

    #[test]
    fn test_nameservers_are_replaced_not_unioned() {
        let merged = merge(
            map(vec![("nserver", list(&["a"]))]),
            map(vec![("nserver", list(&["b", "c"]))]),
        );
        assert_eq!(merged["nserver"], list(&["b", "c"]));
    }

    #[test]
    fn test_nested_nameserver_maps_are_replaced() {
        let base = map(vec![(
            "domain",
            Field::Map(map(vec![
                ("nserver", Field::Map(map(vec![("ns1.a.net", text("192.0.2.1"))]))),
                ("name", text("a.net")),
            ])),
        )]);
        let incoming = map(vec![(
            "domain",
            Field::Map(map(vec![(
                "nserver",
                Field::Map(map(vec![("ns9.b.net", text("192.0.2.9"))])),
            )])),
        )]);

        let merged = merge(base, incoming);
        let domain = merged["domain"].as_map().unwrap();
        let ns = domain["nserver"].as_map().unwrap();
        assert_eq!(ns.len(), 1);
        assert!(ns.contains_key("ns9.b.net"));
        assert_eq!(domain["name"], text("a.net"));
    }

    #[test]
    fn test_nested_maps_recurse() {
        let base = map(vec![(
            "owner",
            Field::Map(map(vec![("name", text("A")), ("email", text("a@example.com"))])),
        )]);
        let incoming = map(vec![(
            "owner",
            Field::Map(map(vec![("email", text("")), ("phone", text("+1.555"))])),
        )]);

        let merged = merge(base, incoming);
        let owner = merged["owner"].as_map().unwrap();
        assert_eq!(owner["name"], text("A"));
        assert_eq!(owner["email"], text("a@example.com"));
        assert_eq!(owner["phone"], text("+1.555"));
    }

    #[test]
    fn test_server_history_appends_in_order_regardless_of_batching() {
        let a = RegistryInfo {
            servers: vec![hop("a")],
            ..Default::default()
        };
        let b = RegistryInfo {
            servers: vec![hop("b")],
            ..Default::default()
        };
        let c = RegistryInfo {
            servers: vec![hop("c")],
            ..Default::default()
        };

        let mut sequential = RegistryInfo::default();
        merge_registry_info(&mut sequential, a.clone());
        merge_registry_info(&mut sequential, b.clone());
        merge_registry_info(&mut sequential, c.clone());

        let mut batched_tail = b;
        merge_registry_info(&mut batched_tail, c);
        let mut batched = a;
        merge_registry_info(&mut batched, batched_tail);

        assert_eq!(sequential.servers, batched.servers);
        let names: Vec<&str> = sequential.servers.iter().map(|h| h.server.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_registrar_follows_scalar_rule() {
        let mut base = RegistryInfo {
            registrar: Some("ARIN".to_string()),
            ..Default::default()
        };
        merge_registry_info(
            &mut base,
            RegistryInfo {
                registrar: Some(" ".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(base.registrar.as_deref(), Some("ARIN"));
    }
}
