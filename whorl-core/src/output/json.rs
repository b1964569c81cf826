use super::OutputFormatter;
use crate::bulk::BulkResult;
use crate::whois::Record;

pub struct JsonFormatter {
    pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    fn to_json<T: serde::Serialize + ?Sized>(&self, value: &T) -> String {
        if self.pretty {
            serde_json::to_string_pretty(value)
                .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
        } else {
            serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_record(&self, _target: &str, record: &Record) -> String {
        self.to_json(record)
    }

    fn format_bulk(&self, results: &[BulkResult]) -> String {
        self.to_json(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetType;
    use crate::whois::{Field, ServerHop};

    #[test]
    fn test_record_shape() {
        let mut record = Record::new();
        record.push_hop(ServerHop {
            server: "whois.verisign-grs.com".to_string(),
            args: "example.com".to_string(),
            port: 43,
        });
        record.registry_info.kind = Some(TargetType::Domain);
        let mut domain = crate::whois::FieldMap::new();
        domain.insert("name".to_string(), Field::text("EXAMPLE.COM"));
        record.registrant_info.insert("domain".to_string(), Field::Map(domain));

        let json = JsonFormatter::new().compact().format_record("example.com", &record);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["regyinfo"]["type"], "domain");
        assert_eq!(value["regyinfo"]["servers"][0]["port"], 43);
        assert_eq!(value["regrinfo"]["domain"]["name"], "EXAMPLE.COM");
    }
}
