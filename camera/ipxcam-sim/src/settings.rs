use ipxcam::{Error, Result};

/// Camera settings as stored on disk.
///
/// The format is line based. Leading lines which start with `#` (or have no
/// tab) form the header. Every following line is `name<TAB>value`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsFile {
    headers: Vec<String>,
    /// All nodes, with preserved order.
    nodes: Vec<(String, String)>,
}

impl SettingsFile {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            nodes: Vec::new(),
        }
    }

    pub fn parse(settings: &str) -> Result<Self> {
        let mut headers = Vec::new();
        let mut nodes: Vec<(String, String)> = Vec::new();
        let mut header_done = false;
        for (lineno, line) in settings.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if !header_done {
                if line.starts_with('#') || !line.contains('\t') {
                    headers.push(line.to_string());
                    continue;
                }
                header_done = true;
            }

            let mut elements = line.split('\t');
            match (elements.next(), elements.next(), elements.next()) {
                (Some(key), Some(value), None) => {
                    if nodes.iter().any(|(k, _)| k == key) {
                        return Err(Error::WrongConfiguration(format!(
                            "line {}: \"{key}\" set more than once",
                            lineno + 1
                        )));
                    }
                    nodes.push((key.to_string(), value.to_string()));
                }
                _ => {
                    return Err(Error::WrongConfiguration(format!(
                        "line {}: expected 2 tab-separated elements: {line}",
                        lineno + 1
                    )));
                }
            }
        }
        Ok(Self { headers, nodes })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn nodes(&self) -> &[(String, String)] {
        &self.nodes
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.nodes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key`, appending it if not yet present.
    pub fn update(&mut self, key: &str, value: String) {
        match self.nodes.iter_mut().find(|(k, _)| k == key) {
            Some(node) => node.1 = value,
            None => self.nodes.push((key.to_string(), value)),
        }
    }
}

impl std::fmt::Display for SettingsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for header in self.headers.iter() {
            writeln!(f, "{header}")?;
        }
        for (key, value) in self.nodes.iter() {
            writeln!(f, "{key}\t{value}")?;
        }
        Ok(())
    }
}

/// Convert a float to a string with a minimum precision of 1.
///
/// This ensures at least a ".0" at the end to allow distinguishing this is a
/// float (from an int).
pub(crate) fn float_to_str(val: f64) -> String {
    let orig = format!("{}", val);
    if orig.contains('.') || orig.contains("inf") || orig.contains("NaN") {
        orig
    } else {
        format!("{}.0", orig)
    }
}
