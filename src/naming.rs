//! Output filename templates
//!
//! Templates use `{name}`, `{sku}`, `{slug}`, `{title}`, `{width}` and
//! `{height}` placeholders. Unknown placeholders are left as written.

use crate::config::ProcessingConfig;
use crate::models::CatalogItem;
use std::path::Path;

/// Values available to a filename template.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext<'a> {
    pub name: &'a str,
    pub sku: &'a str,
    pub slug: &'a str,
    pub title: &'a str,
    pub width: u32,
    pub height: u32,
}

impl<'a> TemplateContext<'a> {
    /// Context for a local file: only `{name}` and the canvas size are set.
    pub fn for_file(source: &'a Path, config: &ProcessingConfig) -> Self {
        Self {
            name: file_stem(source),
            width: config.canvas_width(),
            height: config.canvas_height(),
            ..Self::default()
        }
    }

    /// Context for an image belonging to a catalog item.
    pub fn for_item(item: &'a CatalogItem, source: &'a Path, config: &ProcessingConfig) -> Self {
        Self {
            name: file_stem(source),
            sku: &item.sku,
            slug: &item.slug,
            title: &item.name,
            width: config.canvas_width(),
            height: config.canvas_height(),
        }
    }
}

fn file_stem(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("image")
}

impl TemplateContext<'_> {
    fn value(&self, key: &str) -> Option<String> {
        match key {
            "name" => Some(self.name.to_string()),
            "sku" => Some(self.sku.to_string()),
            "slug" => Some(self.slug.to_string()),
            "title" => Some(self.title.to_string()),
            "width" => Some(self.width.to_string()),
            "height" => Some(self.height.to_string()),
            _ => None,
        }
    }
}

/// Render `template` and make the result safe to use as a file name.
///
/// Placeholders are expanded in one pass over the template, so braces inside
/// substituted values are never expanded again.
pub fn render(template: &str, ctx: &TemplateContext<'_>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| ctx.value(&after[..close]).map(|value| (close, value)));
        match value {
            Some((close, value)) => {
                rendered.push_str(&value);
                rest = &after[close + 1..];
            }
            None => {
                rendered.push('{');
                rest = after;
            }
        }
    }
    rendered.push_str(rest);

    let sanitized: String = rendered
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim().trim_matches('.');
    if trimmed.is_empty() {
        ctx.name.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TemplateContext<'static> {
        TemplateContext {
            name: "IMG_001",
            sku: "SKU-9",
            slug: "blue-shirt",
            title: "Blue Shirt",
            width: 900,
            height: 600,
        }
    }

    #[test]
    fn test_renders_default_template() {
        assert_eq!(
            render("{slug}_{sku}_{width}x{height}", &ctx()),
            "blue-shirt_SKU-9_900x600"
        );
    }

    #[test]
    fn test_renders_name_and_title() {
        assert_eq!(render("{title} - {name}", &ctx()), "Blue Shirt - IMG_001");
    }

    #[test]
    fn test_strips_path_separators() {
        let context = TemplateContext {
            sku: "a/b\\c",
            ..ctx()
        };
        assert_eq!(render("{sku}", &context), "a-b-c");
    }

    #[test]
    fn test_empty_render_falls_back_to_name() {
        let context = TemplateContext {
            sku: "",
            ..ctx()
        };
        assert_eq!(render("{sku}", &context), "IMG_001");
    }

    #[test]
    fn test_braces_in_values_are_not_expanded() {
        let context = TemplateContext {
            sku: "{width}",
            title: "{name}",
            ..ctx()
        };
        assert_eq!(render("{sku}_{title}_{height}", &context), "{width}_{name}_600");
    }

    #[test]
    fn test_unknown_and_unclosed_placeholders_stay_literal() {
        assert_eq!(render("{color}-{slug}-{size", &ctx()), "{color}-blue-shirt-{size");
        assert_eq!(render("{{name}}", &ctx()), "{IMG_001}");
    }

    #[test]
    fn test_file_context_has_no_item_fields() {
        let config = ProcessingConfig::new(300, 200).unwrap();
        let path = Path::new("/photos/beach.jpg");
        let context = TemplateContext::for_file(path, &config);

        assert_eq!(render("{name}_{sku}{width}x{height}", &context), "beach_300x200");
    }
}
