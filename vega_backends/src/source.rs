//! Indented source text sink used by the OpenCL backend

/// A string sink with an explicit indent counter.
pub struct SourceBuilder {
    text: String,
    indent: usize,
}

impl SourceBuilder {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            indent: 0,
        }
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.text.push_str("    ");
        }
        self.text.push_str(text.as_ref());
        self.text.push('\n');
    }

    pub fn blank(&mut self) {
        self.text.push('\n');
    }

    /// A line at column zero regardless of indent (labels, pragmas).
    pub fn raw_line(&mut self, text: impl AsRef<str>) {
        self.text.push_str(text.as_ref());
        self.text.push('\n');
    }

    pub fn open(&mut self, text: impl AsRef<str>) {
        self.line(format!("{} {{", text.as_ref()));
        self.indent += 1;
    }

    pub fn close(&mut self) {
        self.indent -= 1;
        self.line("}");
    }

    pub fn finish(self) -> String {
        self.text
    }
}

impl Default for SourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indentation() {
        let mut source = SourceBuilder::new();
        source.open("void f()");
        source.line("int x = 0;");
        source.raw_line("label:;");
        source.close();
        assert_eq!(source.finish(), "void f() {\n    int x = 0;\nlabel:;\n}\n");
    }
}
