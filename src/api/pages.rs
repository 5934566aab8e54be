//! HTML fragments for the built-in pages.

use core::fmt::Write as _;

use super::codec::escape_html;
use super::router::RouteDoc;

/// Navigation bar linking the given paths.
pub fn nav<'a>(paths: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::from("<nav>");
    for path in paths {
        let path = escape_html(path);
        let _ = write!(out, "<a href=\"{path}\">{path}</a> ");
    }
    out.push_str("</nav>");
    out
}

/// Index listing the navigable routes.
pub fn index<'a>(paths: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::from("<h1>Breadboard</h1><ul>");
    for path in paths {
        let path = escape_html(path);
        let _ = write!(out, "<li><a href=\"{path}\">{path}</a></li>");
    }
    out.push_str("</ul>");
    out
}

/// Documentation for every documented route, grouped in registration
/// order.
pub fn docs<'a>(routes: impl IntoIterator<Item = (&'a str, &'a RouteDoc)>) -> String {
    let mut out = String::from("<h1>API</h1>");
    let mut group: Option<&str> = None;
    for (path, doc) in routes {
        if group != Some(doc.group.as_str()) {
            group = Some(doc.group.as_str());
            let _ = write!(out, "<h2>{}</h2>", escape_html(&doc.group));
            if !doc.group_summary.is_empty() {
                let _ = write!(out, "<p>{}</p>", escape_html(&doc.group_summary));
            }
        }
        let _ = write!(
            out,
            "<h3><a href=\"{path}\">{path}</a></h3><p>{}</p>",
            escape_html(&doc.summary),
            path = escape_html(path)
        );
        if !doc.params.is_empty() {
            out.push_str("<ul>");
            for p in doc.params {
                let _ = write!(
                    out,
                    "<li><code>{}</code>{}: {}</li>",
                    p.name,
                    if p.required { " (required)" } else { "" },
                    escape_html(p.doc)
                );
            }
            out.push_str("</ul>");
        }
    }
    out
}

/// Retained log lines, oldest first.
pub fn logs(lines: &[String]) -> String {
    let mut out = String::from("<h1>Logs</h1><pre>");
    for line in lines {
        out.push_str(&escape_html(line));
        out.push('\n');
    }
    out.push_str("</pre>");
    out
}

/// Body of a 404.
pub fn not_found(path: &str) -> String {
    format!("<h1>404 - Page Not Found</h1><p>{}</p>", escape_html(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::device::Param;

    const PARAMS: &[Param] = &[Param::required("value", "Speed <0-100>.")];

    #[test]
    fn docs_group_routes_and_escape_text() {
        let set = RouteDoc {
            group: "fan".into(),
            group_summary: "A 4-pin PWM fan.".into(),
            summary: "Set the speed.".into(),
            params: PARAMS,
        };
        let off = RouteDoc {
            params: &[],
            summary: "Turn off.".into(),
            ..set.clone()
        };
        let html = docs([("/fan/set", &set), ("/fan/off", &off)]);
        assert_eq!(html.matches("<h2>fan</h2>").count(), 1);
        assert!(html.contains("<code>value</code> (required): Speed &lt;0-100&gt;."));
        assert!(html.find("/fan/set").unwrap() < html.find("/fan/off").unwrap());
    }

    #[test]
    fn logs_render_one_line_each() {
        let html = logs(&["a".into(), "<b>".into()]);
        assert!(html.contains("a\n&lt;b&gt;\n"));
    }
}
