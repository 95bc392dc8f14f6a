use url::Url;

const MAX_TITLE_CHARS: usize = 50;

/// Short human name for a page, used in issue titles.
///
/// The site root is "Homepage"; otherwise the last path segment with `-`/`_`
/// turned into spaces and each word capitalized.
pub fn page_title(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return "Page".to_string();
    };
    let Some(last) = parsed.path().split('/').filter(|s| !s.is_empty()).last() else {
        return "Homepage".to_string();
    };

    let mut out = String::with_capacity(last.len());
    let mut word_start = true;
    for c in last.chars().map(|c| if c == '-' || c == '_' { ' ' } else { c }) {
        if word_start && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        word_start = !(c.is_alphanumeric() || c == '\'');
    }
    out.chars().take(MAX_TITLE_CHARS).collect()
}
