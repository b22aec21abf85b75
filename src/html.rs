//! The fixed HTML element catalog exposed to templates as `html.<tag>(attrs, children)`.

/// Every element name the sandbox exposes under `html.<name>`.
pub const TAGS: &[&str] = &[
    "!DOCTYPE", "a", "abbr", "acronym", "address", "applet", "area", "article", "aside",
    "audio", "b", "base", "basefont", "bdi", "bdo", "big", "blockquote", "body", "br",
    "button", "canvas", "caption", "center", "cite", "code", "col", "colgroup", "data",
    "datalist", "dd", "del", "details", "dfn", "dialog", "dir", "div", "dl", "dt", "em",
    "embed", "fieldset", "figcaption", "figure", "font", "footer", "form", "frame",
    "frameset", "h1", "head", "header", "hr", "html", "i", "iframe", "img", "input", "ins",
    "kbd", "label", "legend", "li", "link", "main", "map", "mark", "meta", "meter", "nav",
    "noframes", "noscript", "object", "ol", "optgroup", "option", "output", "p", "param",
    "picture", "pre", "progress", "q", "rp", "rt", "ruby", "s", "samp", "script", "section",
    "select", "small", "source", "span", "strike", "strong", "style", "sub", "summary",
    "sup", "svg", "table", "tbody", "td", "template", "textarea", "tfoot", "th", "thead",
    "time", "title", "tr", "track", "tt", "u", "ul", "var", "video", "wbr",
];

/// `true` when `name` is a recognized element (including the synthetic `!DOCTYPE`).
pub fn is_known_tag(name: &str) -> bool {
    TAGS.contains(&name)
}

/// Serializes an element: `attrs` is a flat alternating key/value list, `children` a list of
/// already-serialized child strings. An element with no children self-closes.
///
/// `<tag k='v' ...>child1child2...</tag>` or `<tag k='v' ... />`.
pub fn render_tag(name: &str, attrs: &[(String, String)], children: &[String]) -> String {
    let mut out = String::new();
    out.push('<');
    out.push_str(name);
    for (k, v) in attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("='");
        out.push_str(v);
        out.push('\'');
    }
    if children.is_empty() {
        out.push_str(" />");
    } else {
        out.push('>');
        for child in children {
            out.push_str(child);
        }
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
    out
}
