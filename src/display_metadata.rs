//! Element dump printing for the CLI verbose mode

use crate::dicom::DicomElements;

/// Print the element dictionary, one row per element, sequences indented.
pub fn print_metadata(elements: &DicomElements) {
    for row in elements.dump() {
        let indent = "  ".repeat(row.depth);
        let name = row.name.unwrap_or("");
        let value = truncate(&row.value, 70);
        println!(
            "{indent}{tag} {vr} {length:>6} {name:<34} {value}",
            tag = row.tag,
            vr = row.vr,
            length = row.length as i64,
        );
    }
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let head: String = value.chars().take(max).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 70), "short");
        let long = "x".repeat(100);
        let cut = truncate(&long, 70);
        assert_eq!(cut.len(), 73);
        assert!(cut.ends_with("..."));
    }
}
