//! HTML pages.
//!
//! All dynamic values are HTML-escaped.

use crate::documents::{AttachmentOutcome, NOT_ENOUGH_INFO};

/// Wrap a body fragment in a minimal document.
fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>{title}</title>
<style>
body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 32px; color: #333; }}
pre {{ background: #f5f5f5; border-radius: 4px; padding: 10px; white-space: pre-wrap; word-break: break-all; }}
.error {{ background:#fee; border:1px solid #c00; color:#c00; padding:10px; border-radius:4px; }}
</style>
</head>
<body>
{body}
</body>
</html>"#,
        title = html_escape(title),
        body = body,
    )
}

/// Index page before authorization (or after the token went stale).
///
/// `authorize_url` is `None` when the server runs without auth.
pub fn render_unauthorized(authorize_url: Option<&str>) -> String {
    let mut body = String::from("<h1>Hello</h1>\n");
    match authorize_url {
        Some(url) => {
            body.push_str(&format!(r#"<p>Please <a href="{}">authorize</a>.</p>"#, html_escape(url)));
        }
        None => body.push_str("<p>Running against a no-auth server, nothing to demo here.</p>"),
    }
    body.push_str("\n<p><a href=\"/reset\" style=\"font-size:small;\">Reset</a></p>");
    layout("SMART on FHIR Demo", &body)
}

/// Index page for an authorized session with a resolved patient.
pub fn render_authorized(patient_name: &str, outcomes: &[AttachmentOutcome]) -> String {
    let mut body = String::from("<h1>Hello</h1>\n");
    body.push_str(&format!(
        "<p>You are authorized and ready to make API requests for <em>{}</em>.</p>\n",
        html_escape(patient_name)
    ));

    if outcomes.is_empty() {
        body.push_str("<p>There is no document</p>\n");
    }
    for outcome in outcomes {
        body.push_str(&render_outcome(outcome));
        body.push('\n');
    }

    body.push_str(r#"<p><a href="/logout">Change patient</a></p>"#);
    layout("SMART on FHIR Demo", &body)
}

fn render_outcome(outcome: &AttachmentOutcome) -> String {
    match outcome {
        AttachmentOutcome::Saved { path, bytes, json, .. } => format!(
            "<p>Saved <code>{}</code> ({bytes} bytes)</p><pre>{}</pre>",
            html_escape(&path.display().to_string()),
            html_escape(json)
        ),
        AttachmentOutcome::Empty { binary_id, json } => format!(
            "<p>Binary <code>{}</code> has no content</p><pre>{}</pre>",
            html_escape(binary_id),
            html_escape(json)
        ),
        AttachmentOutcome::NotEnoughInfo => format!("<p>{NOT_ENOUGH_INFO}</p>"),
    }
}

/// EHR landing page: echoes the launch parameters and links to `/_launch/`.
pub fn render_launch(iss: Option<&str>, launch: Option<&str>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    if let Some(launch) = launch {
        query.append_pair("launch", launch);
    }
    if let Some(iss) = iss {
        query.append_pair("iss", iss);
    }
    let href = format!("/_launch/?{}", query.finish());

    let body = format!(
        r#"<h1>App Testing Launching Page</h1>
<p>You are launching from EHR</p>
<p><a href="{href}">Click Here to begin</a></p>
<p>iss={iss}</p>
<p>launch={launch}</p>"#,
        href = html_escape(&href),
        iss = html_escape(iss.unwrap_or_default()),
        launch = html_escape(launch.unwrap_or_default()),
    );
    layout("App Testing Launching Page", &body)
}

/// Inline error page for a failed authorization exchange.
pub fn render_auth_error(message: &str) -> String {
    let body = format!(
        r#"<h1>Authorization Error</h1>
<p class="error">{}</p>
<p><a href="/">Start over</a></p>"#,
        html_escape(message)
    );
    layout("Authorization Error", &body)
}

/// Escape HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<script>alert("xss")</script>"#),
            "&lt;script&gt;alert(&quot;xss&quot;)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_unauthorized_with_link() {
        let html = render_unauthorized(Some("https://auth/authorize?a=1&b=2"));
        assert!(html.contains(r#"href="https://auth/authorize?a=1&amp;b=2""#));
        assert!(html.contains("/reset"));
        assert!(!html.contains("You are authorized"));
    }

    #[test]
    fn test_unauthorized_no_auth_server() {
        let html = render_unauthorized(None);
        assert!(html.contains("no-auth server"));
        assert!(!html.contains("authorize</a>"));
    }

    #[test]
    fn test_authorized_without_documents() {
        let html = render_authorized("Nancy Smart", &[]);
        assert!(html.contains("<em>Nancy Smart</em>"));
        assert!(html.contains("There is no document"));
        assert!(html.contains("/logout"));
    }

    #[test]
    fn test_authorized_outcomes_in_order() {
        let outcomes = vec![
            AttachmentOutcome::NotEnoughInfo,
            AttachmentOutcome::Saved {
                binary_id: "b1".into(),
                path: PathBuf::from("b1.pdf"),
                bytes: 3,
                json: r#"{"id":"b1"}"#.into(),
            },
        ];
        let html = render_authorized("X", &outcomes);

        let marker = html.find(NOT_ENOUGH_INFO).unwrap();
        let json = html.find("{&quot;id&quot;:&quot;b1&quot;}").unwrap();
        assert!(marker < json);
        assert!(html.contains("<code>b1.pdf</code> (3 bytes)"));
        assert!(!html.contains("There is no document"));
    }

    #[test]
    fn test_launch_page_carries_parameters() {
        let html = render_launch(Some("https://ehr/fhir"), Some("abc 123"));
        assert!(html.contains("/_launch/?launch=abc+123&amp;iss=https%3A%2F%2Fehr%2Ffhir"));
        assert!(html.contains("iss=https://ehr/fhir"));
    }

    #[test]
    fn test_auth_error_page() {
        let html = render_auth_error("No authorization code in <callback>");
        assert!(html.contains("Authorization Error"));
        assert!(html.contains("&lt;callback&gt;"));
        assert!(html.contains(r#"<a href="/">Start over</a>"#));
    }
}
