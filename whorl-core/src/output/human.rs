use colored::Colorize;

use super::OutputFormatter;
use crate::bulk::BulkResult;
use crate::whois::{Field, FieldMap, Record};

pub struct HumanFormatter {
    use_colors: bool,
    show_raw: bool,
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: true,
            show_raw: false,
        }
    }

    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    /// Append the raw responses after the structured fields.
    pub fn with_raw(mut self) -> Self {
        self.show_raw = true;
        self
    }

    fn label(&self, text: &str) -> String {
        if self.use_colors {
            text.cyan().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn value(&self, text: &str) -> String {
        if self.use_colors {
            text.white().to_string()
        } else {
            text.to_string()
        }
    }

    fn muted(&self, text: &str) -> String {
        if self.use_colors {
            text.bright_black().to_string()
        } else {
            text.to_string()
        }
    }

    fn error(&self, text: &str) -> String {
        if self.use_colors {
            text.red().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn header(&self, text: &str) -> String {
        if self.use_colors {
            format!("\n{}\n{}", text.magenta().bold(), "─".repeat(text.chars().count()).bright_black())
        } else {
            format!("\n{}\n{}", text, "-".repeat(text.chars().count()))
        }
    }

    fn push_fields(&self, output: &mut Vec<String>, map: &FieldMap, depth: usize) {
        let indent = "  ".repeat(depth);
        for (key, field) in map {
            match field {
                Field::Text(text) => {
                    output.push(format!("{}{}: {}", indent, self.label(key), self.value(text)));
                }
                Field::List(items) => {
                    output.push(format!("{}{}:", indent, self.label(key)));
                    for item in items {
                        output.push(format!("{}  - {}", indent, self.value(item)));
                    }
                }
                Field::Map(inner) => {
                    output.push(format!("{}{}:", indent, self.label(key)));
                    self.push_fields(output, inner, depth + 1);
                }
            }
        }
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_record(&self, target: &str, record: &Record) -> String {
        let mut output = Vec::new();
        output.push(self.header(&format!("WHOIS: {}", target)));

        let info = &record.registry_info;
        if let Some(kind) = info.kind {
            output.push(format!("  {}: {}", self.label("Type"), self.value(kind.as_str())));
        }
        if let Some(ref registrar) = info.registrar {
            output.push(format!("  {}: {}", self.label("Registry"), self.value(registrar)));
        }
        if let Some(ref referrer) = info.referrer {
            output.push(format!("  {}: {}", self.label("Referrer"), self.value(referrer)));
        }
        if !info.servers.is_empty() {
            output.push(format!("  {}:", self.label("Servers")));
            for (i, hop) in info.servers.iter().enumerate() {
                output.push(format!(
                    "    {}. {} {}",
                    i + 1,
                    self.value(&format!("{}:{}", hop.server, hop.port)),
                    self.muted(&format!("[{}]", hop.args))
                ));
            }
        }

        for (role, field) in &record.registrant_info {
            match field {
                Field::Map(map) => {
                    output.push(self.header(role));
                    self.push_fields(&mut output, map, 1);
                }
                other => {
                    let mut single = FieldMap::new();
                    single.insert(role.clone(), other.clone());
                    self.push_fields(&mut output, &single, 1);
                }
            }
        }

        if !record.errors.is_empty() {
            output.push(self.header("Errors"));
            for error in &record.errors {
                output.push(format!("  {} {}", self.error("✗"), error));
            }
        }

        if self.show_raw && !record.raw_lines.is_empty() {
            output.push(self.header("Raw response"));
            output.extend(record.raw_lines.iter().map(|line| self.muted(line)));
        }

        output.join("\n")
    }

    fn format_bulk(&self, results: &[BulkResult]) -> String {
        let succeeded = results.iter().filter(|r| r.success).count();
        let mut output = Vec::new();
        output.push(self.header(&format!(
            "Bulk WHOIS: {}/{} resolved",
            succeeded,
            results.len()
        )));

        for result in results {
            let summary = result
                .record
                .registry_info
                .servers
                .last()
                .map(|hop| hop.server.clone())
                .unwrap_or_else(|| result.record.errors.join("; "));
            let marker = if result.success {
                self.value("✓")
            } else {
                self.error("✗")
            };
            output.push(format!(
                "  {} {} {} {}",
                marker,
                self.label(&result.target),
                summary,
                self.muted(&format!("({} ms)", result.duration_ms))
            ));
        }

        output.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetType;
    use crate::whois::ServerHop;

    fn sample() -> Record {
        let mut record = Record::new();
        record.push_hop(ServerHop {
            server: "whois.verisign-grs.com".to_string(),
            args: "example.com".to_string(),
            port: 43,
        });
        record.registry_info.kind = Some(TargetType::Domain);
        let mut domain = FieldMap::new();
        domain.insert("name".to_string(), Field::text("EXAMPLE.COM"));
        domain.insert(
            "nserver".to_string(),
            Field::List(vec!["a.iana-servers.net".to_string(), "b.iana-servers.net".to_string()]),
        );
        record.registrant_info.insert("domain".to_string(), Field::Map(domain));
        record.errors.push("Timeout reading from whois.registrar.test".to_string());
        record
    }

    #[test]
    fn test_plain_record() {
        let text = HumanFormatter::new().without_colors().format_record("example.com", &sample());
        assert!(text.contains("WHOIS: example.com"));
        assert!(text.contains("  Type: domain"));
        assert!(text.contains("    1. whois.verisign-grs.com:43 [example.com]"));
        assert!(text.contains("  name: EXAMPLE.COM"));
        assert!(text.contains("    - b.iana-servers.net"));
        assert!(text.contains("✗ Timeout reading from whois.registrar.test"));
        assert!(!text.contains("Raw response"));
    }
}
