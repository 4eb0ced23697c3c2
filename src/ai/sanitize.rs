//! Speech-safe text.
//!
//! Chat models answer in Markdown; read aloud, the markup is noise. This strips
//! emphasis markers, keeps only the text of links, turns bullet-list breaks
//! into a comma separator and flattens every remaining line break into one
//! space. The result goes to speech synthesis only; history keeps the reply
//! as the model wrote it.

use once_cell::sync::Lazy;
use regex::Regex;

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid bold pattern"));
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").expect("valid italic pattern"));
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(.*?)\]\(.*?\)").expect("valid link pattern"));
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n- ").expect("valid bullet pattern"));
static LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n]+").expect("valid line break pattern"));

fn sanitize_once(text: &str) -> String {
    let text = BOLD.replace_all(text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = LINK.replace_all(&text, "$1");
    let text = BULLET.replace_all(&text, ", ");
    LINE_BREAKS.replace_all(&text, " ").into_owned()
}

/// Strip presentation markup from `text` for speech synthesis.
///
/// Passes repeat until nothing changes, so markup uncovered by an earlier pass
/// (e.g. a link nested in link text) is removed too and
/// `sanitize_for_speech(sanitize_for_speech(x)) == sanitize_for_speech(x)`.
pub fn sanitize_for_speech(text: &str) -> String {
    let mut current = sanitize_once(text);
    loop {
        let next = sanitize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}
