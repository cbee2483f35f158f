//! Syntax highlighting for snippet pages.
//!
//! Languages resolve against syntect's bundled syntaxes (by extension or
//! case-insensitive name). Styles resolve against the bundled themes, plus a
//! few short aliases so the stored default `friendly` has a theme.

use std::sync::LazyLock;

use scribe_common::ScribeError;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

const STYLE_ALIASES: &[(&str, &str)] = &[
    ("friendly", "InspiredGitHub"),
    ("default", "InspiredGitHub"),
    ("ocean", "base16-ocean.dark"),
    ("eighties", "base16-eighties.dark"),
    ("mocha", "base16-mocha.dark"),
    ("solarized-dark", "Solarized (dark)"),
    ("solarized-light", "Solarized (light)"),
];

fn find_syntax(language: &str) -> Option<&'static SyntaxReference> {
    SYNTAX_SET.find_syntax_by_token(language.trim())
}

fn find_theme(style: &str) -> Option<&'static Theme> {
    let style = style.trim();
    let name = STYLE_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(style))
        .map_or(style, |(_, theme)| *theme);
    THEME_SET.themes.get(name)
}

pub fn is_known_language(language: &str) -> bool {
    find_syntax(language).is_some()
}

pub fn is_known_style(style: &str) -> bool {
    find_theme(style).is_some()
}

/// Render `code` as a `<pre>` block of inline-styled spans.
///
/// Unknown languages fall back to plain text and unknown styles to the
/// `friendly` theme, so records stored before validation still render.
pub fn highlight_html(
    code: &str,
    language: &str,
    style: &str,
    linenos: bool,
) -> Result<String, ScribeError> {
    let syntax = find_syntax(language).unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());
    let theme = find_theme(style)
        .or_else(|| find_theme("friendly"))
        .ok_or_else(|| ScribeError::Internal("no highlight theme available".into()))?;

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut body = String::new();
    for (n, line) in LinesWithEndings::from(code).enumerate() {
        let regions = highlighter
            .highlight_line(line, &SYNTAX_SET)
            .map_err(|e| ScribeError::Internal(format!("highlight failed: {}", e)))?;
        if linenos {
            body.push_str(&format!("<span class=\"lineno\">{:>4}</span> ", n + 1));
        }
        let html = styled_line_to_highlighted_html(&regions, IncludeBackground::No)
            .map_err(|e| ScribeError::Internal(format!("highlight failed: {}", e)))?;
        body.push_str(&html);
    }

    let background = theme
        .settings
        .background
        .map(|c| format!(" style=\"background-color:#{:02x}{:02x}{:02x};\"", c.r, c.g, c.b))
        .unwrap_or_default();

    Ok(format!("<pre class=\"highlight\"{}>\n{}</pre>", background, body))
}
