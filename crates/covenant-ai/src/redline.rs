//! Tracked-change markup for redline and clean artifacts.
//!
//! The redline format is plain text with inline change spans:
//! `[[-struck wording-]]` marks a deletion, `[[+inserted wording+]]` an
//! insertion. A modification is a deletion span immediately followed by an
//! insertion span. Applying a redline removes deletion spans and unwraps
//! insertion spans. The lifecycle treats both artifacts as opaque bytes;
//! only this module knows the markup.

use covenant_core::ClauseAnalysis;

const DEL_OPEN: &str = "[[-";
const DEL_CLOSE: &str = "-]]";
const INS_OPEN: &str = "[[+";
const INS_CLOSE: &str = "+]]";

/// Weave change spans for each analysed clause into the original text.
///
/// Clauses are located verbatim (segmentation yields exact substrings); a
/// clause that cannot be found, such as one rewritten by an earlier span,
/// is appended as a trailing change block instead of being dropped.
pub fn build_redline(original: &str, analyses: &[ClauseAnalysis]) -> String {
    let mut out = original.to_string();
    for analysis in analyses {
        let span = match change_span(analysis) {
            Some(span) => span,
            None => continue,
        };
        if out.contains(&analysis.original_text) {
            out = out.replacen(&analysis.original_text, &span, 1);
        } else {
            out.push('\n');
            out.push_str(&span);
        }
    }
    out
}

/// Markup for one clause, or `None` when the clause is unchanged.
fn change_span(analysis: &ClauseAnalysis) -> Option<String> {
    match analysis.suggested_text.as_deref() {
        None => Some(format!(
            "{DEL_OPEN}{}{DEL_CLOSE}",
            analysis.original_text
        )),
        Some(suggested) if suggested != analysis.original_text => Some(format!(
            "{DEL_OPEN}{}{DEL_CLOSE}{INS_OPEN}{suggested}{INS_CLOSE}",
            analysis.original_text
        )),
        Some(_) => None,
    }
}

/// Apply a redline: strike deletion spans, keep insertion bodies.
///
/// Unterminated spans keep their text rather than eating the rest of the
/// document.
pub fn apply_redline(redline: &str) -> String {
    let mut out = String::with_capacity(redline.len());
    let mut rest = redline;

    while let Some(start) = rest.find(DEL_OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + DEL_OPEN.len()..];
        match after.find(DEL_CLOSE) {
            Some(end) => rest = &after[end + DEL_CLOSE.len()..],
            None => {
                out.push_str(after);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);

    out.replace(INS_OPEN, "").replace(INS_CLOSE, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(original: &str, suggested: Option<&str>) -> ClauseAnalysis {
        ClauseAnalysis {
            clause_text: original.to_string(),
            original_text: original.to_string(),
            suggested_text: suggested.map(str::to_string),
            confidence_score: 50,
        }
    }

    #[test]
    fn modification_produces_del_ins_pair() {
        let redline = build_redline(
            "keep this. change this sentence. keep that.",
            &[analysis("change this sentence.", Some("the new sentence."))],
        );
        assert_eq!(
            redline,
            "keep this. [[-change this sentence.-]][[+the new sentence.+]] keep that."
        );
    }

    #[test]
    fn removal_produces_del_only() {
        let redline = build_redline(
            "first. second.",
            &[analysis("second.", None)],
        );
        assert_eq!(redline, "first. [[-second.-]]");
    }

    #[test]
    fn unchanged_clause_leaves_text_alone() {
        let text = "nothing to see here.";
        let redline = build_redline(text, &[analysis("nothing to see here.", Some("nothing to see here."))]);
        assert_eq!(redline, text);
    }

    #[test]
    fn unlocatable_clause_is_appended() {
        let redline = build_redline("body.", &[analysis("phantom clause", Some("better clause"))]);
        assert!(redline.starts_with("body.\n"));
        assert!(redline.contains("[[-phantom clause-]][[+better clause+]]"));
    }

    #[test]
    fn apply_accepts_modifications_and_removals() {
        let redline = "keep. [[-old wording-]][[+new wording+]] middle. [[-gone.-]] end.";
        assert_eq!(
            apply_redline(redline),
            "keep. new wording middle.  end."
        );
    }

    #[test]
    fn round_trip_through_builder() {
        let original = "alpha clause. beta clause. gamma clause.";
        let redline = build_redline(
            original,
            &[
                analysis("beta clause.", Some("delta clause.")),
                analysis("gamma clause.", None),
            ],
        );
        assert_eq!(apply_redline(&redline), "alpha clause. delta clause. ");
    }

    #[test]
    fn apply_tolerates_unterminated_span() {
        assert_eq!(apply_redline("text [[-broken"), "text broken");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(apply_redline("no markup at all"), "no markup at all");
    }
}
