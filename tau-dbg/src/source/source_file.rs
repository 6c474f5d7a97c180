/// The debugged program's original source, split into lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFile {
    lines: Vec<String>,
}

impl SourceFile {
    pub fn new(content: &str) -> SourceFile {
        let mut lines: Vec<String> = content.split('\n').map(str::to_owned).collect();
        if lines.last().is_some_and(String::is_empty) {
            lines.pop();
        }
        SourceFile { lines }
    }

    pub fn line(&self, idx: usize) -> Option<&str> {
        self.lines.get(idx).map(String::as_str)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}
