//! Server-rendered HTML pages.
//!
//! The results page shows the same report three ways: every detail with an
//! embedded player, players only, and a compact collapsible list.

use std::fmt::Write;

use hlgen_models::{ClipOutcome, HighlightEntry, HighlightReport};
use serde::Deserialize;

const STYLE: &str = include_str!("../assets/style.css");

/// Which arrangement of the results to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Detail,
    Clips,
    List,
}

impl View {
    const ALL: [View; 3] = [View::Detail, View::Clips, View::List];

    fn param(self) -> &'static str {
        match self {
            View::Detail => "detail",
            View::Clips => "clips",
            View::List => "list",
        }
    }

    fn label(self) -> &'static str {
        match self {
            View::Detail => "🎬 All Details",
            View::Clips => "🎥 Clips Only",
            View::List => "📋 List View",
        }
    }
}

/// Escape text for HTML element content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

fn format_duration(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{:.0}", secs)
    } else {
        format!("{:.1}", secs)
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>{STYLE}</style>
</head>
<body>
<main>
<h1 class="main-title">🎬 Video Highlights Generator</h1>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
    )
}

fn alert(message: &str) -> String {
    format!(r#"<div class="alert" role="alert">{}</div>"#, escape(message))
}

/// Landing page with the upload form, optionally with an error banner.
pub fn landing(error: Option<&str>, max_upload_mb: u64) -> String {
    let mut body = String::new();
    if let Some(message) = error {
        body.push_str(&alert(message));
    }

    let _ = write!(
        body,
        r#"<section class="upload">
<h3>Upload Video</h3>
<p>Choose a video file to analyze and extract highlights.</p>
<p><strong>Note:</strong> Maximum file size is {max}MB</p>
<form action="/upload" method="post" enctype="multipart/form-data">
<input type="file" name="video" accept=".mp4,video/mp4" required>
<br>
<button type="submit">Extract Highlights</button>
</form>
</section>
<section>
<h3>Welcome to Video Highlights Generator! 👋</h3>
<p>This tool helps you automatically extract and create engaging highlights from your videos.</p>
<p>To get started:</p>
<ol>
<li>Upload your video using the form above (max {max}MB)</li>
<li>Click "Extract Highlights"</li>
<li>View your highlights in different formats using the tabs on the results page</li>
</ol>
<p>The AI will analyze your video and identify the most compelling moments, creating perfectly timed clips that capture the essence of your content.</p>
</section>"#,
        max = max_upload_mb,
    );

    page("Video Highlights Generator", &body)
}

fn clip_url(session_id: &str, file_name: &str) -> String {
    format!("/api/sessions/{}/clips/{}", escape(session_id), escape(file_name))
}

fn title(entry: &HighlightEntry) -> String {
    escape(&entry.descriptor.title())
}

fn time_range(entry: &HighlightEntry) -> String {
    format!(
        "{} - {}",
        escape(&entry.descriptor.start_time),
        escape(&entry.descriptor.end_time)
    )
}

fn player(session_id: &str, clip: &ClipOutcome) -> String {
    match clip {
        ClipOutcome::Ready { file_name, .. } => format!(
            r#"<video controls preload="metadata" src="{}"></video>"#,
            clip_url(session_id, file_name)
        ),
        ClipOutcome::Failed { error } => format!(r#"<p class="failed">Clip unavailable: {}</p>"#, escape(error)),
    }
}

fn detail_view(report: &HighlightReport, out: &mut String) {
    for entry in &report.highlights {
        let duration = entry
            .duration_secs
            .map(|d| format!(r#"<p class="caption">Duration: {} seconds</p>"#, format_duration(d)))
            .unwrap_or_default();
        let upload_warning = match &entry.clip {
            ClipOutcome::Ready {
                upload_error: Some(e), ..
            } => format!(r#"<p class="caption">Clip was not copied to cloud storage: {}</p>"#, escape(e)),
            _ => String::new(),
        };

        let _ = write!(
            out,
            r#"<div class="highlight-card">
<h3>{title}</h3>
{player}
{upload_warning}<div class="info">
<div><p><strong>⏱️ Time Range</strong></p><code>{range}</code>{duration}</div>
<div><p><strong>💡 Why This Moment Matters</strong></p><p><em>{reason}</em></p></div>
</div>
</div>
"#,
            title = title(entry),
            player = player(&report.session_id, &entry.clip),
            range = time_range(entry),
            reason = escape(&entry.descriptor.reason),
        );
    }
}

fn clips_view(report: &HighlightReport, out: &mut String) {
    for entry in report.ready() {
        let _ = write!(
            out,
            "<div class=\"clip\">\n<h3>{}</h3>\n{}\n<hr>\n</div>\n",
            title(entry),
            player(&report.session_id, &entry.clip)
        );
    }
    if report.clips_ready == 0 {
        out.push_str(r#"<p class="caption">No clips could be produced for this video.</p>"#);
    }
}

fn list_view(report: &HighlightReport, out: &mut String) {
    for entry in &report.highlights {
        let failure = entry
            .clip
            .error()
            .map(|e| format!(r#"<p class="failed">Clip failed: {}</p>"#, escape(e)))
            .unwrap_or_default();
        let _ = write!(
            out,
            "<details>\n<summary>{}</summary>\n<p><strong>Time Range:</strong> <code>{}</code></p>\n<p><strong>Why This Moment:</strong> <em>{}</em></p>\n{}</details>\n",
            title(entry),
            time_range(entry),
            escape(&entry.descriptor.reason),
            failure
        );
    }
}

/// Results page for a finished run.
pub fn results(report: &HighlightReport, view: View) -> String {
    let mut body = String::new();

    let _ = write!(
        body,
        r#"<p class="caption">{file} · {ready} of {total} clips ready · <a href="/">Analyze another video</a></p>"#,
        file = escape(&report.video.file_name),
        ready = report.clips_ready,
        total = report.highlights.len(),
    );
    if report.clips_failed > 0 {
        body.push_str(&alert(&format!(
            "{} highlight clip(s) could not be generated. Details are shown below.",
            report.clips_failed
        )));
    }

    body.push_str("<nav class=\"tabs\">");
    for tab in View::ALL {
        let _ = write!(
            body,
            r#"<a href="?view={}"{}>{}</a>"#,
            tab.param(),
            if tab == view { r#" class="active""# } else { "" },
            tab.label()
        );
    }
    body.push_str("</nav>\n");

    match view {
        View::Detail => detail_view(report, &mut body),
        View::Clips => clips_view(report, &mut body),
        View::List => list_view(report, &mut body),
    }

    page("Highlights · Video Highlights Generator", &body)
}
