//! Replication allowlist (`pg_hba.conf`)
//!
//! Rules are matched first-to-last by the server, so a rule added for a
//! new follower goes in front of the first existing rule.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HbaRule {
    pub conn_type: String,
    pub database: String,
    pub user: String,
    pub address: Option<String>,
    pub method: String,
}

impl HbaRule {
    /// `host replication <user> <address> <method>`
    pub fn replication(user: &str, address: &str, method: &str) -> Self {
        Self {
            conn_type: "host".to_string(),
            database: "replication".to_string(),
            user: user.to_string(),
            address: Some(address.to_string()),
            method: method.to_string(),
        }
    }

    fn render(&self) -> String {
        match &self.address {
            Some(address) => format!(
                "{}\t{}\t{}\t{}\t{}",
                self.conn_type, self.database, self.user, address, self.method
            ),
            None => format!(
                "{}\t{}\t{}\t{}",
                self.conn_type, self.database, self.user, self.method
            ),
        }
    }

    fn admits_replication(&self, user: &str, address: &str) -> bool {
        self.conn_type.starts_with("host")
            && list_contains(&self.database, "replication")
            && (list_contains(&self.user, user) || list_contains(&self.user, "all"))
            && self.address.as_deref() == Some(address)
            && self.method != "reject"
    }
}

fn list_contains(list: &str, item: &str) -> bool {
    list.split(',').any(|v| v.trim() == item)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HbaLine {
    Rule { rule: HbaRule, raw: String },
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HbaFile {
    lines: Vec<HbaLine>,
}

impl HbaFile {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|raw| match parse_rule(raw) {
                Some(rule) => HbaLine::Rule {
                    rule,
                    raw: raw.to_string(),
                },
                None => HbaLine::Other(raw.to_string()),
            })
            .collect();
        Self { lines }
    }

    pub fn rules(&self) -> impl Iterator<Item = &HbaRule> {
        self.lines.iter().filter_map(|l| match l {
            HbaLine::Rule { rule, .. } => Some(rule),
            HbaLine::Other(_) => None,
        })
    }

    /// Some rule lets `user` replicate from `address`.
    pub fn admits_replication(&self, user: &str, address: &str) -> bool {
        self.rules().any(|r| r.admits_replication(user, address))
    }

    /// Add a replication rule unless one already admits the follower.
    /// Returns true when the file changed.
    pub fn ensure_replication(&mut self, user: &str, address: &str, method: &str) -> bool {
        if self.admits_replication(user, address) {
            return false;
        }
        let rule = HbaRule::replication(user, address, method);
        let raw = rule.render();
        let at = self
            .lines
            .iter()
            .position(|l| matches!(l, HbaLine::Rule { .. }))
            .unwrap_or(self.lines.len());
        self.lines.insert(at, HbaLine::Rule { rule, raw });
        true
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                HbaLine::Rule { raw, .. } | HbaLine::Other(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }
}

fn parse_rule(raw: &str) -> Option<HbaRule> {
    let content = raw.split('#').next().unwrap_or("").trim();
    let fields: Vec<&str> = content.split_whitespace().collect();
    match fields.as_slice() {
        ["local", database, user, method, ..] => Some(HbaRule {
            conn_type: "local".to_string(),
            database: database.to_string(),
            user: user.to_string(),
            address: None,
            method: method.to_string(),
        }),
        [conn_type, database, user, address, method, ..] if conn_type.starts_with("host") => {
            Some(HbaRule {
                conn_type: conn_type.to_string(),
                database: database.to_string(),
                user: user.to_string(),
                address: Some(address.to_string()),
                method: method.to_string(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HBA: &str = "\
# TYPE  DATABASE        USER            ADDRESS                 METHOD
local   all             all                                     trust
host    all             all             0.0.0.0/0               scram-sha-256
host    replication     replicator      idp2.example.org        scram-sha-256 # follower
";

    #[test]
    fn test_parse_rules() {
        let file = HbaFile::parse(HBA);
        let rules: Vec<_> = file.rules().collect();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].conn_type, "local");
        assert_eq!(rules[0].address, None);
        assert_eq!(rules[2].address.as_deref(), Some("idp2.example.org"));
        assert_eq!(rules[2].method, "scram-sha-256");
    }

    #[test]
    fn test_admits_existing_follower() {
        let file = HbaFile::parse(HBA);
        assert!(file.admits_replication("replicator", "idp2.example.org"));
        assert!(!file.admits_replication("replicator", "idp1.example.org"));
        // "all" databases does not include replication connections
        assert!(!file.admits_replication("someone", "0.0.0.0/0"));
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut file = HbaFile::parse(HBA);
        assert!(!file.ensure_replication("replicator", "idp2.example.org", "scram-sha-256"));
        assert_eq!(file.render(), HBA);
    }

    #[test]
    fn test_ensure_inserts_before_first_rule() {
        let mut file = HbaFile::parse(HBA);
        assert!(file.ensure_replication("replicator", "idp1.example.org", "scram-sha-256"));
        let out = file.render();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("# TYPE"));
        assert_eq!(lines[1], "host\treplication\treplicator\tidp1.example.org\tscram-sha-256");
        assert!(lines[2].starts_with("local"));
        assert!(file.admits_replication("replicator", "idp1.example.org"));
    }

    #[test]
    fn test_reject_rule_does_not_admit() {
        let file = HbaFile::parse("host replication replicator 10.0.0.2/32 reject\n");
        assert!(!file.admits_replication("replicator", "10.0.0.2/32"));
    }

    #[test]
    fn test_empty_file() {
        let mut file = HbaFile::parse("");
        assert!(file.ensure_replication("replicator", "10.0.0.2/32", "scram-sha-256"));
        assert_eq!(
            file.render(),
            "host\treplication\treplicator\t10.0.0.2/32\tscram-sha-256\n"
        );
    }
}
