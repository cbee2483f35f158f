//! Snippet endpoints. Anyone may read; only the owner may write.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Html,
};
use chrono::Utc;
use scribe_common::constants::SNIPPET_FIELD_MAX_LEN;
use scribe_common::{FieldErrors, NewSnippet, Page, ScribeError, Snippet, SnippetView};
use serde::Deserialize;

use super::{ApiError, ApiResult, PageQuery, check_page, json_body, parse_id};
use crate::auth::{Action, Caller, Resource, authorize, authorize_object};
use crate::highlight::{highlight_html, is_known_language, is_known_style};
use crate::state::AppState;

const DEFAULT_LANGUAGE: &str = "python";
const DEFAULT_STYLE: &str = "friendly";

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SnippetRequest {
    title: Option<String>,
    code: Option<String>,
    linenos: Option<bool>,
    language: Option<String>,
    style: Option<String>,
}

impl SnippetRequest {
    /// Field checks. A partial update may omit `code`.
    fn validate(&self, partial: bool) -> Result<(), ScribeError> {
        let mut errors = FieldErrors::new();

        match self.code.as_deref() {
            None if !partial => errors.add("code", "This field is required."),
            Some(code) if code.trim().is_empty() => {
                errors.add("code", "This field may not be blank.")
            }
            _ => {}
        }

        for (name, value, blank_ok) in [
            ("title", &self.title, true),
            ("language", &self.language, false),
            ("style", &self.style, false),
        ] {
            let Some(value) = value else {
                continue;
            };
            if !blank_ok && value.trim().is_empty() {
                errors.add(name, "This field may not be blank.");
                continue;
            }
            if value.chars().count() > SNIPPET_FIELD_MAX_LEN {
                errors.add(
                    name,
                    format!(
                        "Ensure this field has no more than {} characters.",
                        SNIPPET_FIELD_MAX_LEN
                    ),
                );
            }
        }

        if let Some(language) = self.language.as_deref().filter(|v| !v.trim().is_empty()) {
            if !is_known_language(language) {
                errors.add("language", format!("\"{}\" is not a valid choice.", language));
            }
        }
        if let Some(style) = self.style.as_deref().filter(|v| !v.trim().is_empty()) {
            if !is_known_style(style) {
                errors.add("style", format!("\"{}\" is not a valid choice.", style));
            }
        }

        errors.into_result()
    }

    /// Overwrite the fields that were supplied
    fn apply(self, snippet: &mut Snippet) {
        if let Some(title) = self.title {
            snippet.title = title;
        }
        if let Some(code) = self.code {
            snippet.code = code;
        }
        if let Some(linenos) = self.linenos {
            snippet.linenos = linenos;
        }
        if let Some(language) = self.language {
            snippet.language = language;
        }
        if let Some(style) = self.style {
            snippet.style = style;
        }
    }
}

pub async fn list_snippets(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<SnippetView>>> {
    authorize(&caller, Resource::Snippets, Action::List)?;

    let page = query.number()?;
    let page_size = state.config.pagination.page_size;
    let (count, snippets) = state
        .snippets
        .list_snippets((page - 1).saturating_mul(page_size), page_size)
        .await?;
    check_page(page, page_size, count)?;

    let results = snippets.iter().map(Snippet::view).collect();
    Ok(Json(Page::new("/snippets/", page, page_size, count, results)))
}

/// Create a snippet owned by the caller
pub async fn create_snippet(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<SnippetRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SnippetView>)> {
    authorize(&caller, Resource::Snippets, Action::Create)?;
    let (Some(owner_id), Some(owner_username)) = (caller.user_id(), caller.username()) else {
        return Err(ScribeError::Forbidden.into());
    };

    let request = json_body(payload)?;
    request.validate(false)?;

    let snippet = state
        .snippets
        .insert_snippet(NewSnippet {
            owner_id,
            owner_username: owner_username.to_string(),
            title: request.title.unwrap_or_default(),
            code: request.code.unwrap_or_default(),
            linenos: request.linenos.unwrap_or(false),
            language: request.language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            style: request.style.unwrap_or_else(|| DEFAULT_STYLE.to_string()),
            created: Utc::now(),
        })
        .await?;

    tracing::info!(snippet_id = snippet.id, owner_id, "Created snippet");
    Ok((StatusCode::CREATED, Json(snippet.view())))
}

/// Load a snippet and run both gate checks for `action` on it
async fn load_authorized(
    state: &AppState,
    caller: &Caller,
    raw_id: &str,
    action: Action,
) -> Result<Snippet, ApiError> {
    authorize(caller, Resource::Snippets, action)?;

    let id = parse_id(raw_id)?;
    let snippet = state
        .snippets
        .get_snippet(id)
        .await?
        .ok_or(ScribeError::NotFound)?;

    authorize_object(caller, Resource::Snippets, action, snippet.owner_id)?;
    Ok(snippet)
}

pub async fn retrieve_snippet(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<SnippetView>> {
    let snippet = load_authorized(&state, &caller, &id, Action::Retrieve).await?;
    Ok(Json(snippet.view()))
}

pub async fn update_snippet(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<SnippetRequest>, JsonRejection>,
) -> ApiResult<Json<SnippetView>> {
    save_changes(&state, &caller, &id, Action::Update, payload).await
}

pub async fn partial_update_snippet(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<SnippetRequest>, JsonRejection>,
) -> ApiResult<Json<SnippetView>> {
    save_changes(&state, &caller, &id, Action::PartialUpdate, payload).await
}

async fn save_changes(
    state: &AppState,
    caller: &Caller,
    raw_id: &str,
    action: Action,
    payload: Result<Json<SnippetRequest>, JsonRejection>,
) -> ApiResult<Json<SnippetView>> {
    let mut snippet = load_authorized(state, caller, raw_id, action).await?;

    let request = json_body(payload)?;
    request.validate(action == Action::PartialUpdate)?;
    request.apply(&mut snippet);

    let snippet = state.snippets.update_snippet(snippet).await?;
    tracing::info!(snippet_id = snippet.id, ?action, "Updated snippet");
    Ok(Json(snippet.view()))
}

pub async fn destroy_snippet(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let snippet = load_authorized(&state, &caller, &id, Action::Destroy).await?;

    if !state.snippets.delete_snippet(snippet.id).await? {
        return Err(ScribeError::NotFound.into());
    }

    tracing::info!(snippet_id = snippet.id, "Deleted snippet");
    Ok(StatusCode::NO_CONTENT)
}

/// The snippet's code as a standalone HTML page
pub async fn highlight_snippet(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Html<String>> {
    let snippet = load_authorized(&state, &caller, &id, Action::Highlight).await?;
    Ok(Html(render_highlight(&snippet)?))
}

fn render_highlight(snippet: &Snippet) -> Result<String, ScribeError> {
    let code = highlight_html(
        &snippet.code,
        &snippet.language,
        &snippet.style,
        snippet.linenos,
    )?;

    let title = html_escape::encode_text(&snippet.title);
    Ok(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{title}</title>\n</head>\n<body>\n\
         <h2>{title}</h2>\n{code}\n</body>\n</html>\n",
        title = title,
        code = code,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(code: &str, linenos: bool) -> Snippet {
        NewSnippet {
            owner_id: 1,
            owner_username: "alice".into(),
            title: "<b>demo</b>".into(),
            code: code.into(),
            linenos,
            language: DEFAULT_LANGUAGE.into(),
            style: DEFAULT_STYLE.into(),
            created: Utc::now(),
        }
        .with_id(3)
    }

    #[test]
    fn test_highlight_escapes_markup() {
        let html = render_highlight(&snippet("if a < b:\n    print('<x>')", false)).unwrap();
        assert!(html.contains("<title>&lt;b&gt;demo&lt;/b&gt;</title>"));
        assert!(html.contains("&lt;"));
        assert!(!html.contains("<x>"));
        assert!(!html.contains("class=\"lineno\""));
    }

    #[test]
    fn test_highlight_uses_language_and_style() {
        let html = render_highlight(&snippet("a = 1\nb = 2", true)).unwrap();
        assert!(html.contains("<pre class=\"highlight\""));
        assert!(html.contains("<span style=\""));
        assert!(html.contains("<span class=\"lineno\">   1</span> "));
        assert!(html.contains("<span class=\"lineno\">   2</span> "));

        let mut dark = snippet("a = 1\nb = 2", true);
        dark.style = "mocha".into();
        assert_ne!(render_highlight(&dark).unwrap(), html);
    }

    #[test]
    fn test_validate_rejects_unknown_choices() {
        let request = SnippetRequest {
            code: Some("x".into()),
            language: Some("klingon".into()),
            style: Some("no-such-theme".into()),
            ..Default::default()
        };
        match request.validate(false).unwrap_err() {
            ScribeError::Validation(errors) => {
                assert!(errors.contains("language"));
                assert!(errors.contains("style"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let request = SnippetRequest {
            code: Some("x".into()),
            language: Some("rust".into()),
            style: Some("InspiredGitHub".into()),
            ..Default::default()
        };
        assert!(request.validate(false).is_ok());
    }

    #[test]
    fn test_validate_create_and_partial() {
        assert!(SnippetRequest::default().validate(true).is_ok());

        match SnippetRequest::default().validate(false).unwrap_err() {
            ScribeError::Validation(errors) => assert!(errors.contains("code")),
            other => panic!("unexpected error: {other:?}"),
        }

        let request = SnippetRequest {
            code: Some("x".into()),
            title: Some("t".repeat(101)),
            style: Some(" ".into()),
            ..Default::default()
        };
        match request.validate(false).unwrap_err() {
            ScribeError::Validation(errors) => {
                assert!(errors.contains("title"));
                assert!(errors.contains("style"));
                assert!(!errors.contains("code"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_apply_only_supplied_fields() {
        let mut target = snippet("a = 1", false);
        SnippetRequest {
            linenos: Some(true),
            ..Default::default()
        }
        .apply(&mut target);

        assert!(target.linenos);
        assert_eq!(target.code, "a = 1");
        assert_eq!(target.language, DEFAULT_LANGUAGE);
    }
}
