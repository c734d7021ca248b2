//! Section-based key/value text codec backing the profile and token stores.
//!
//! The format is the AWS-config dialect: `[section]` headers followed by
//! `key = value` lines. Sections and keys are case-sensitive and keep their
//! insertion order so rewrites produce stable diffs.

/// One `[name]` section and its key/value entries, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniSection {
    pub name: String,
    entries: Vec<(String, String)>,
}

impl IniSection {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// An in-memory INI document. Parse, mutate, render; the caller owns the
/// whole-file-replace write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniFile {
    sections: Vec<IniSection>,
}

impl IniFile {
    pub fn parse(content: &str) -> Self {
        let mut doc = IniFile::default();
        let mut current: Option<IniSection> = None;

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                if let Some(section) = current.take() {
                    doc.sections.push(section);
                }
                current = Some(IniSection {
                    name: trimmed[1..trimmed.len() - 1].to_string(),
                    entries: Vec::new(),
                });
                continue;
            }

            if let Some((key, value)) = trimmed.split_once('=') {
                if let Some(section) = current.as_mut() {
                    section
                        .entries
                        .push((key.trim().to_string(), value.trim().to_string()));
                }
            }
        }

        if let Some(section) = current.take() {
            doc.sections.push(section);
        }

        doc
    }

    pub fn sections(&self) -> impl Iterator<Item = &IniSection> {
        self.sections.iter()
    }

    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn ensure_section(&mut self, name: &str) -> &mut IniSection {
        if let Some(idx) = self.sections.iter().position(|s| s.name == name) {
            return &mut self.sections[idx];
        }
        self.sections.push(IniSection {
            name: name.to_string(),
            entries: Vec::new(),
        });
        self.sections.last_mut().unwrap()
    }

    pub fn remove_section(&mut self, name: &str) -> bool {
        let before = self.sections.len();
        self.sections.retain(|s| s.name != name);
        self.sections.len() != before
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ensure_section(section).set(key, value);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push('[');
            out.push_str(&section.name);
            out.push_str("]\n");
            for (key, value) in section.entries() {
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(value);
                out.push('\n');
            }
        }
        out
    }
}

/// Replace (or append) a single `[name]` section in raw file text, leaving
/// every other line byte-identical. Used for the shared AWS credentials
/// file, which this tool does not own.
pub fn replace_section(content: &str, name: &str, entries: &[(&str, &str)]) -> String {
    let header = format!("[{name}]");
    let mut rendered = String::new();
    rendered.push_str(&header);
    rendered.push('\n');
    for (key, value) in entries {
        rendered.push_str(&format!("{key} = {value}\n"));
    }

    let mut out = String::new();
    let mut in_target = false;
    let mut replaced = false;

    for line in content.lines() {
        let trimmed = line.trim();
        let is_header = trimmed.starts_with('[') && trimmed.ends_with(']');

        if is_header {
            if trimmed == header {
                in_target = true;
                if !replaced {
                    out.push_str(&rendered);
                    replaced = true;
                }
                continue;
            }
            in_target = false;
        }

        if !in_target {
            out.push_str(line);
            out.push('\n');
        }
    }

    if !replaced {
        if !out.is_empty() && !out.ends_with("\n\n") {
            out.push('\n');
        }
        out.push_str(&rendered);
    }

    out
}
