//! Purpose: Translate comment markers between the on-disk and parser conventions.
//! Exports: `DISK_COMMENT`, `PARSER_COMMENT`, `to_parser_markers`, `to_disk_markers`.
//! Role: Pure text functions applied only at the config store's load/save boundary.
//! Invariants: Loading applies `to_parser_markers`; saving applies `to_disk_markers`.
//! Invariants: Substitution is global over the raw text, not limited to comment lines.

/// Comment marker used by the gateway's plugin configuration files.
pub const DISK_COMMENT: char = ';';
/// Comment marker understood by the in-memory parser.
pub const PARSER_COMMENT: char = '#';

pub fn to_parser_markers(text: &str) -> String {
    text.replace(DISK_COMMENT, &PARSER_COMMENT.to_string())
}

pub fn to_disk_markers(text: &str) -> String {
    text.replace(PARSER_COMMENT, &DISK_COMMENT.to_string())
}
