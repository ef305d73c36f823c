//! Small text helpers shared by the generator and the program factories.

/// Whether `s` is a valid GLSL identifier.
pub fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Turn an arbitrary graph name into an identifier usable as a function name.
pub fn sanitize_ident(s: &str) -> String {
    let mut out: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Indent every non-empty line by `levels` four-space steps.
pub fn indent(source: &str, levels: usize) -> String {
    let pad = "    ".repeat(levels);
    source
        .replace("\r\n", "\n")
        .lines()
        .map(|line| {
            let line = line.trim_end();
            if line.trim().is_empty() {
                "\n".to_string()
            } else {
                format!("{pad}{line}\n")
            }
        })
        .collect()
}

/// Source listing with line numbers, used when reporting compile failures.
pub fn numbered_listing(source: &str) -> String {
    let mut output = String::from("---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");
    output
}

/// Rewrite whole identifiers of `source`. `f` sees each identifier with the
/// text that follows it and returns its replacement, if any.
pub fn map_identifiers(source: &str, f: impl Fn(&str, &str) -> Option<&'static str>) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find(|c: char| c.is_ascii_alphanumeric() || c == '_') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let (word, tail) = rest.split_at(end);
        match f(word, tail) {
            Some(replacement) if is_ident(word) => out.push_str(replacement),
            _ => out.push_str(word),
        }
        rest = tail;
    }
    out.push_str(rest);
    out
}
