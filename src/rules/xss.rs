//! Cross-site scripting challenge (`xss_001`)
//!
//! Safe: output passes through an escaping or sanitizing call, or an
//! autoescaping template. Unsafe: raw variables interpolated into HTML, or
//! autoescaping explicitly switched off.

use super::{PatternSet, Verdict};

const SAFE_PATTERNS: &[&str] = &[
    r"\b(?:html\.|markupsafe\.|flask\.)?escape\(",
    r"\bbleach\.clean\(",
    r"\bconditional_escape\(",
    r"\bformat_html\(",
    r"\brender_template\(",
];

const UNSAFE_PATTERNS: &[&str] = &[
    r"\bMarkup\(",
    r"\bmark_safe\(",
    r"\|\s*safe\b",
    r"\brender_template_string\(",
    // f"<p>{name}</p>"
    r#"\bf(?:"[^"\n]*<[A-Za-z][^"\n]*\{\s*[A-Za-z_][\w.]*\s*\}|'[^'\n]*<[A-Za-z][^'\n]*\{\s*[A-Za-z_][\w.]*\s*\})"#,
    // "<p>" + name
    r#"(?m)["'][^"'\n]*<[A-Za-z][^"'\n]*["']\s*\+\s*[A-Za-z_][\w.]*\s*(?:\+|$)"#,
    // name + "</p>"
    r#"[A-Za-z_][\w.]*\s*\+\s*["'][^"'\n]*</[A-Za-z]"#,
];

pub struct CrossSiteScriptingRule {
    safe: PatternSet,
    risky: PatternSet,
}

impl CrossSiteScriptingRule {
    pub fn new() -> Self {
        Self {
            safe: PatternSet::new(SAFE_PATTERNS),
            risky: PatternSet::new(UNSAFE_PATTERNS),
        }
    }

    pub fn evaluate(&self, code: &str) -> Verdict {
        Verdict::from_signals(
            self.safe.is_match(code),
            self.risky.is_match(code),
            "Output is escaped before rendering.",
            "An escaping call is present, but unescaped user input still reaches the HTML output.",
            "User input is written into HTML without escaping.",
            "No escaping or sanitization detected before output. Escape user input before \
             rendering it.",
        )
    }
}

impl Default for CrossSiteScriptingRule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Band;

    #[test]
    fn test_all_patterns_compile() {
        let rule = CrossSiteScriptingRule::new();
        assert_eq!(rule.safe.len(), SAFE_PATTERNS.len());
        assert_eq!(rule.risky.len(), UNSAFE_PATTERNS.len());
    }

    #[test]
    fn test_escaped_output_scores_full() {
        let rule = CrossSiteScriptingRule::new();
        for code in [
            "from markupsafe import escape\n\
             name = request.args.get('name', '')\n\
             return f\"<p>Hello {escape(name)}</p>\"\n",
            "return render_template('greet.html', name=request.args['name'])\n",
            "import html\nreturn '<p>' + html.escape(comment) + '</p>'\n",
        ] {
            assert_eq!(rule.evaluate(code).band, Band::Full, "{code}");
        }
    }

    #[test]
    fn test_raw_interpolation_scores_zero() {
        let rule = CrossSiteScriptingRule::new();
        for code in [
            "name = request.args.get('name')\nreturn f\"<h1>Hello {name}</h1>\"\n",
            "return \"<div>\" + comment + \"</div>\"\n",
        ] {
            let verdict = rule.evaluate(code);
            assert_eq!(verdict.band, Band::Zero, "{code}");
            assert!(verdict.feedback.contains("without escaping"));
        }
    }

    #[test]
    fn test_escape_with_bypass_is_partial() {
        let code = "safe = escape(name)\nreturn Markup(f\"<b>{bio}</b>\") + safe\n";
        assert_eq!(CrossSiteScriptingRule::new().evaluate(code).band, Band::Partial);
    }

    #[test]
    fn test_nothing_relevant() {
        let verdict = CrossSiteScriptingRule::new().evaluate("pass\n");
        assert_eq!(verdict.band, Band::Zero);
        assert!(verdict.feedback.starts_with("No escaping"));
    }
}
