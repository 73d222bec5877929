use crate::paths::strip_md;

/// Where a link occurrence came from, and how its edge row is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    Wikilink,
    Markdown,
    Tag,
    Frontmatter,
}

impl LinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wikilink => "wikilink",
            Self::Markdown => "markdown",
            Self::Tag => "tag",
            Self::Frontmatter => "frontmatter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "wikilink" => Some(Self::Wikilink),
            "markdown" => Some(Self::Markdown),
            "tag" => Some(Self::Tag),
            "frontmatter" => Some(Self::Frontmatter),
            _ => None,
        }
    }
}

/// One link found in a note. `raw_link` is the exact substring of the
/// source line (brackets included for wikilinks and markdown links), which
/// is what the rewrite engine searches for. The target has any trailing
/// `.md` already stripped; `subpath` keeps its leading `#`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOccurrence {
    pub target: String,
    pub is_basename: bool,
    pub is_relative: bool,
    pub link_type: LinkType,
    pub raw_link: String,
    pub subpath: String,
    pub line_start: u32,
    pub line_end: u32,
}

impl LinkOccurrence {
    /// `[[#Heading]]` / `[text](#heading)`: an edge back to the source.
    pub fn is_self_link(&self) -> bool {
        self.target.is_empty() && !self.subpath.is_empty()
    }

    pub fn is_tag(&self) -> bool {
        matches!(self.link_type, LinkType::Tag | LinkType::Frontmatter)
    }

    /// Path-shaped target: vault-relative, relative, or `/`-absolute.
    pub fn is_path_link(&self) -> bool {
        !self.is_tag() && !self.target.is_empty() && !self.is_basename
    }
}

/// Lex a note body into link occurrences: frontmatter tags first, then
/// per-line wikilinks, markdown links, and inline tags, with fenced code
/// blocks and inline code spans elided.
pub fn parse_links(content: &str) -> Vec<LinkOccurrence> {
    let lines: Vec<&str> = content.lines().collect();
    let mut out = Vec::new();
    let mut body_start = 0usize;

    if lines.first().is_some_and(|l| l.trim() == "---") {
        if let Some(close) = lines.iter().skip(1).position(|l| l.trim() == "---") {
            let close = close + 1;
            frontmatter_tags(&lines[1..close], &mut out);
            body_start = close + 1;
        }
    }

    let mut in_fence = false;
    for (ix, line) in lines.iter().enumerate().skip(body_start) {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let line_no = (ix + 1) as u32;
        let stripped = strip_inline_code(line);
        wikilinks_in_line(&stripped, line_no, &mut out);
        markdown_links_in_line(&stripped, line_no, &mut out);
        tags_in_line(&stripped, line_no, &mut out);
    }

    out
}

/// Re-parse a stored `raw_link` (e.g. when classifying edges loaded from
/// the index). Line numbers are zeroed.
pub fn parse_raw_link(raw: &str, link_type: LinkType) -> Option<LinkOccurrence> {
    match link_type {
        LinkType::Wikilink => {
            let inner = raw.strip_prefix("[[")?.strip_suffix("]]")?;
            wikilink_occurrence(inner, 0)
        }
        LinkType::Markdown => {
            let (_, url) = markdown_parts(raw)?;
            markdown_occurrence(url, raw, 0)
        }
        LinkType::Tag | LinkType::Frontmatter => None,
    }
}

/// Split a raw wikilink into `(target_text, subpath, alias)`, all verbatim.
pub fn wikilink_parts(raw: &str) -> Option<(&str, &str, Option<&str>)> {
    let inner = raw.strip_prefix("[[")?.strip_suffix("]]")?;
    let (before_alias, alias) = match inner.split_once('|') {
        Some((l, r)) => (l, Some(r)),
        None => (inner, None),
    };
    let (target, subpath) = match before_alias.find('#') {
        Some(pos) => (&before_alias[..pos], &before_alias[pos..]),
        None => (before_alias, ""),
    };
    Some((target, subpath, alias))
}

/// Split a raw markdown link into `(display, url)`, verbatim.
pub fn markdown_parts(raw: &str) -> Option<(&str, &str)> {
    let raw = raw.strip_suffix(')')?;
    let open = raw.find("](")?;
    Some((raw.get(1..open)?, &raw[open + 2..]))
}

fn frontmatter_tags(yaml: &[&str], out: &mut Vec<LinkOccurrence>) {
    for (ix, line) in yaml.iter().enumerate() {
        let Some(value) = line.strip_prefix("tags:") else {
            continue;
        };
        // The opening `---` is line 1, so yaml index 0 is file line 2.
        let line_no = (ix + 2) as u32;
        let value = value.trim();
        if !value.is_empty() {
            let value = value
                .strip_prefix('[')
                .and_then(|v| v.strip_suffix(']'))
                .unwrap_or(value);
            for item in value.split(',') {
                push_tag(item, None, LinkType::Frontmatter, line_no, out);
            }
        } else {
            let mut j = ix + 1;
            while j < yaml.len() {
                let item_line = yaml[j].trim_start();
                let Some(item) = item_line.strip_prefix('-') else {
                    break;
                };
                push_tag(item, None, LinkType::Frontmatter, (j + 2) as u32, out);
                j += 1;
            }
        }
        return;
    }
}

/// Normalize a tag name and expand each hierarchy prefix into its own
/// occurrence: `#a/b/c` yields `#a`, `#a/b`, `#a/b/c`.
fn push_tag(
    raw_name: &str,
    raw_link: Option<&str>,
    link_type: LinkType,
    line_no: u32,
    out: &mut Vec<LinkOccurrence>,
) {
    let name = raw_name.trim().trim_matches(['\'', '"']);
    let name = name.strip_prefix('#').unwrap_or(name);
    let name = name.trim_end_matches('/');
    let segments: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return;
    }
    let full = format!("#{}", segments.join("/"));
    let raw_link = raw_link.map_or_else(|| full.clone(), str::to_string);
    let mut acc = String::new();
    for segment in segments {
        if !acc.is_empty() {
            acc.push('/');
        }
        acc.push_str(segment);
        out.push(LinkOccurrence {
            target: format!("#{acc}"),
            is_basename: false,
            is_relative: false,
            link_type,
            raw_link: raw_link.clone(),
            subpath: String::new(),
            line_start: line_no,
            line_end: line_no,
        });
    }
}

/// Drop inline code spans. Backticks toggle; an unmatched opener swallows
/// the rest of the line.
fn strip_inline_code(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_code = false;
    for c in line.chars() {
        if c == '`' {
            in_code = !in_code;
        } else if !in_code {
            out.push(c);
        }
    }
    out
}

fn wikilinks_in_line(line: &str, line_no: u32, out: &mut Vec<LinkOccurrence>) {
    let bytes = line.as_bytes();
    let mut i = 0usize;
    while i + 1 < bytes.len() {
        if bytes[i] != b'[' || bytes[i + 1] != b'[' {
            i += 1;
            continue;
        }
        let mut j = i + 2;
        while j + 1 < bytes.len() && !(bytes[j] == b']' && bytes[j + 1] == b']') {
            j += 1;
        }
        if j + 1 >= bytes.len() {
            break;
        }
        if let Some(occ) = wikilink_occurrence(&line[i + 2..j], line_no) {
            out.push(occ);
        }
        i = j + 2;
    }
}

fn wikilink_occurrence(inner: &str, line_no: u32) -> Option<LinkOccurrence> {
    let (before_alias, _alias) = match inner.split_once('|') {
        Some((l, r)) => (l, Some(r)),
        None => (inner, None),
    };
    let (target_text, subpath) = match before_alias.find('#') {
        Some(pos) => (&before_alias[..pos], before_alias[pos..].to_string()),
        None => (before_alias, String::new()),
    };
    let target = strip_md(target_text.trim()).to_string();
    if target.is_empty() && subpath.is_empty() {
        return None;
    }
    let (is_basename, is_relative) = classify_target(&target);
    Some(LinkOccurrence {
        target,
        is_basename,
        is_relative,
        link_type: LinkType::Wikilink,
        raw_link: format!("[[{inner}]]"),
        subpath,
        line_start: line_no,
        line_end: line_no,
    })
}

fn markdown_links_in_line(line: &str, line_no: u32, out: &mut Vec<LinkOccurrence>) {
    let bytes = line.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'[' {
            i += 1;
            continue;
        }
        if i + 1 < bytes.len() && bytes[i + 1] == b'[' {
            // Wikilink; handled by the other scan.
            i += 2;
            continue;
        }
        let mut j = i + 1;
        while j < bytes.len() && bytes[j] != b']' {
            j += 1;
        }
        if j >= bytes.len() {
            break;
        }
        if j + 1 >= bytes.len() || bytes[j + 1] != b'(' {
            i = j + 1;
            continue;
        }
        let mut k = j + 2;
        while k < bytes.len() && bytes[k] != b')' {
            k += 1;
        }
        if k >= bytes.len() {
            break;
        }
        let url = &line[j + 2..k];
        if let Some(occ) = markdown_occurrence(url, &line[i..=k], line_no) {
            out.push(occ);
        }
        i = k + 1;
    }
}

fn markdown_occurrence(url: &str, raw: &str, line_no: u32) -> Option<LinkOccurrence> {
    let url = url.trim();
    if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        return None;
    }
    let (target_text, subpath) = match url.find('#') {
        Some(pos) => (&url[..pos], url[pos..].to_string()),
        None => (url, String::new()),
    };
    let target = strip_md(target_text).to_string();
    if target.is_empty() && subpath.is_empty() {
        return None;
    }
    let (is_basename, is_relative) = classify_target(&target);
    Some(LinkOccurrence {
        target,
        is_basename,
        is_relative,
        link_type: LinkType::Markdown,
        raw_link: raw.to_string(),
        subpath,
        line_start: line_no,
        line_end: line_no,
    })
}

fn classify_target(target: &str) -> (bool, bool) {
    if target.is_empty() {
        return (false, false);
    }
    let is_relative = target.starts_with("./") || target.starts_with("../");
    let is_basename = !is_relative && !target.starts_with('/') && !target.contains('/');
    (is_basename, is_relative)
}

fn tags_in_line(line: &str, line_no: u32, out: &mut Vec<LinkOccurrence>) {
    if line.starts_with("# ") {
        return;
    }
    let masked = mask_link_spans(line);
    let chars: Vec<char> = masked.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i] != '#' {
            i += 1;
            continue;
        }
        if i > 0 && !chars[i - 1].is_whitespace() {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        if j >= chars.len() || !is_tag_first_char(chars[j]) {
            i += 1;
            continue;
        }
        j += 1;
        while j < chars.len() && is_tag_char(chars[j]) {
            j += 1;
        }
        let body: String = chars[i + 1..j].iter().collect();
        let name = body.trim_end_matches('/');
        if !name.is_empty() {
            let raw: String = chars[i..j].iter().collect();
            push_tag(name, Some(&raw), LinkType::Tag, line_no, out);
        }
        i = j;
    }
}

/// Blank out `[[..]]` and `[..](..)` spans with spaces so a `#fragment`
/// inside a link never scans as a tag.
fn mask_link_spans(line: &str) -> String {
    let mut bytes = line.as_bytes().to_vec();
    let mut i = 0usize;
    while i + 1 < bytes.len() {
        if bytes[i] == b'[' && bytes[i + 1] == b'[' {
            let mut j = i + 2;
            while j + 1 < bytes.len() && !(bytes[j] == b']' && bytes[j + 1] == b']') {
                j += 1;
            }
            if j + 1 < bytes.len() {
                bytes[i..j + 2].fill(b' ');
                i = j + 2;
                continue;
            }
        } else if bytes[i] == b'[' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j] != b']' {
                j += 1;
            }
            if j + 1 < bytes.len() && bytes[j + 1] == b'(' {
                let mut k = j + 2;
                while k < bytes.len() && bytes[k] != b')' {
                    k += 1;
                }
                if k < bytes.len() {
                    bytes[i..=k].fill(b' ');
                    i = k + 1;
                    continue;
                }
            }
        }
        i += 1;
    }
    // Masked spans are replaced byte-for-byte with ASCII spaces.
    String::from_utf8(bytes).unwrap_or_else(|_| line.to_string())
}

fn is_tag_first_char(c: char) -> bool {
    !c.is_ascii_digit() && c != '/' && is_tag_char(c)
}

fn is_tag_char(c: char) -> bool {
    if c <= '\u{20}' || c.is_whitespace() {
        return false;
    }
    if matches!(
        c,
        '\'' | '"'
            | '!'
            | '#'
            | '$'
            | '%'
            | '&'
            | '('
            | ')'
            | '*'
            | '+'
            | ','
            | '.'
            | ':'
            | ';'
            | '<'
            | '='
            | '>'
            | '?'
            | '@'
            | '^'
            | '{'
            | '|'
            | '}'
            | '~'
            | '['
            | ']'
            | '\\'
            | '`'
    ) {
        return false;
    }
    !matches!(c, '\u{2000}'..='\u{206F}' | '\u{2E00}'..='\u{2E7F}')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(content: &str) -> Vec<String> {
        parse_links(content).into_iter().map(|o| o.target).collect()
    }

    #[test]
    fn frontmatter_sequence_tags_expand_hierarchies() {
        let occs = parse_links("---\ntags:\n  - foo\n  - bar/baz\n---\nbody\n");
        let got: Vec<_> = occs.iter().map(|o| o.target.as_str()).collect();
        assert_eq!(got, vec!["#foo", "#bar", "#bar/baz"]);
        assert!(occs.iter().all(|o| o.link_type == LinkType::Frontmatter));
        assert_eq!(occs[0].line_start, 3);
        assert_eq!(occs[1].line_start, 4);
    }

    #[test]
    fn frontmatter_scalar_tags_split_on_commas() {
        let occs = parse_links("---\ntags: a, b/c\n---\n");
        let got: Vec<_> = occs.iter().map(|o| o.target.as_str()).collect();
        assert_eq!(got, vec!["#a", "#b", "#b/c"]);
        assert!(occs.iter().all(|o| o.line_start == 2));
    }

    #[test]
    fn fenced_code_blocks_are_skipped() {
        let got = targets("```\n[[notalink]]\n#notatag\n```\n[[link]] #tag\n");
        assert_eq!(got, vec!["link", "#tag"]);
    }

    #[test]
    fn inline_code_spans_are_stripped() {
        let got = targets("before `[[hidden]]` [[seen]] `#no` #yes\n");
        assert_eq!(got, vec!["seen", "#yes"]);
    }

    #[test]
    fn unmatched_backtick_swallows_rest_of_line() {
        assert!(targets("text `[[gone]] #gone\n").is_empty());
    }

    #[test]
    fn wikilink_alias_subpath_and_md_stripping() {
        let occs = parse_links("[[Foo|bar]] [[Dir/Note#Head]] [[Plain.md]]\n");
        assert_eq!(occs[0].target, "Foo");
        assert_eq!(occs[0].raw_link, "[[Foo|bar]]");
        assert!(occs[0].is_basename);
        assert_eq!(occs[1].target, "Dir/Note");
        assert_eq!(occs[1].subpath, "#Head");
        assert!(!occs[1].is_basename);
        assert_eq!(occs[2].target, "Plain");
    }

    #[test]
    fn heading_only_wikilink_is_a_self_link() {
        let occs = parse_links("see [[#Heading]]\n");
        assert_eq!(occs.len(), 1);
        assert!(occs[0].is_self_link());
        assert_eq!(occs[0].subpath, "#Heading");
    }

    #[test]
    fn markdown_links_and_url_skipping() {
        let occs = parse_links("[a](sub/B.md) [b](./C.md#frag) [x](https://e.com) ![img](pic.png)\n");
        assert_eq!(occs.len(), 3);
        assert_eq!(occs[0].target, "sub/B");
        assert_eq!(occs[1].target, "./C");
        assert!(occs[1].is_relative);
        assert_eq!(occs[1].subpath, "#frag");
        assert_eq!(occs[2].target, "pic.png");
        assert!(occs[2].is_basename);
        assert_eq!(occs[2].raw_link, "[img](pic.png)");
    }

    #[test]
    fn relative_classification() {
        let occs = parse_links("[[./A]] [[../B]] [[sub/C]] [[D]]\n");
        assert!(occs[0].is_relative && !occs[0].is_basename);
        assert!(occs[1].is_relative && !occs[1].is_basename);
        assert!(!occs[2].is_relative && !occs[2].is_basename);
        assert!(occs[3].is_basename);
    }

    #[test]
    fn headings_and_digit_tags_are_rejected() {
        assert!(targets("# Title\n").is_empty());
        assert!(targets("#123\n").is_empty());
        assert_eq!(targets("#a123\n"), vec!["#a123"]);
    }

    #[test]
    fn tags_require_a_whitespace_boundary() {
        assert!(targets("word#no\n").is_empty());
        assert_eq!(targets("a #yes\n"), vec!["#yes"]);
        assert_eq!(targets("#start\n"), vec!["#start"]);
    }

    #[test]
    fn tag_hierarchy_expansion_drops_empty_segments() {
        assert_eq!(targets("#a//b/\n"), vec!["#a", "#a/b"]);
    }

    #[test]
    fn fragments_inside_links_are_not_tags() {
        let got = targets("[[Note#head]] [text](other.md#frag)\n");
        assert_eq!(got, vec!["Note", "other"]);
    }

    #[test]
    fn embeds_parse_with_bang_outside_raw() {
        let occs = parse_links("![[Image.png]]\n");
        assert_eq!(occs[0].raw_link, "[[Image.png]]");
        assert_eq!(occs[0].target, "Image.png");
    }

    #[test]
    fn raw_link_round_trip_helpers() {
        let (target, subpath, alias) = wikilink_parts("[[a/b#H|x]]").unwrap();
        assert_eq!((target, subpath, alias), ("a/b", "#H", Some("x")));
        let (display, url) = markdown_parts("[lnk](sub/B.md#f)").unwrap();
        assert_eq!((display, url), ("lnk", "sub/B.md#f"));
        let occ = parse_raw_link("[[B|alias]]", LinkType::Wikilink).unwrap();
        assert!(occ.is_basename);
        assert_eq!(occ.target, "B");
    }
}
