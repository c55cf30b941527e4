use kbq_core::types::Candidate;
use kbq_core::SourceCatalog;

/// Cut `text` to at most `max` characters, ending in `...` when shortened.
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max { return text.to_string(); }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// First `max` characters of `text`, followed by `...` when anything was cut.
pub fn clip_with_marker(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let mut out: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() { out.push_str("..."); }
    out
}

/// First `max` characters of `text`, no marker.
pub fn excerpt(text: &str, max: usize) -> String { text.trim().chars().take(max).collect() }

/// Render the selection as one `[Display Name]` block per source, in order of
/// first appearance, each holding at most `per_source` excerpts.
pub fn assemble_answer(selected: &[Candidate], catalog: &SourceCatalog, per_source: usize, excerpt_chars: usize) -> String {
    let mut blocks: Vec<(&str, Vec<String>)> = Vec::new();
    for candidate in selected {
        let label = candidate.source_label.as_str();
        let pos = match blocks.iter().position(|(l, _)| *l == label) {
            Some(pos) => pos,
            None => {
                blocks.push((label, Vec::new()));
                blocks.len() - 1
            }
        };
        let texts = &mut blocks[pos].1;
        if texts.len() < per_source {
            texts.push(excerpt(&candidate.chunk.text, excerpt_chars));
        }
    }
    blocks
        .into_iter()
        .map(|(label, texts)| format!("[{}]\n{}", catalog.display_name(label), texts.join(" ")))
        .collect::<Vec<_>>()
        .join("\n\n")
}
