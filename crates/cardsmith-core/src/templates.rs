//! Design template catalog types.

use serde::{Deserialize, Serialize};

/// A color variant of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorVariant {
    pub id: String,
    pub color_hex: String,
    pub color_name: String,
    pub preview_url: String,
}

/// A pre-made background design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub preview_url: String,
    #[serde(default)]
    pub color_variants: Vec<ColorVariant>,
    #[serde(default)]
    pub base_price: f64,
}

impl Template {
    pub fn variant(&self, id: &str) -> Option<&ColorVariant> {
        self.color_variants.iter().find(|v| v.id == id)
    }

    /// Preview of the given variant, or of the template itself.
    pub fn preview_for(&self, variant_id: Option<&str>) -> Option<&str> {
        match variant_id {
            Some(id) => self.variant(id).map(|v| v.preview_url.as_str()),
            None => Some(self.preview_url.as_str()),
        }
    }
}

/// Query for a page of templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateQuery {
    pub page: u32,
    pub per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl Default for TemplateQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            product_id: None,
        }
    }
}

/// One page of templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplatePage {
    pub items: Vec<Template>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl TemplatePage {
    /// Slice `all` into the requested page (1-based; page 0 reads as 1).
    pub fn paginate(all: &[Template], query: &TemplateQuery) -> Self {
        let page = query.page.max(1);
        let per_page = query.per_page.max(1);
        let start = (page as usize - 1).saturating_mul(per_page as usize);
        let items = all.iter().skip(start).take(per_page as usize).cloned().collect();
        Self {
            items,
            page,
            per_page,
            total: all.len() as u64,
        }
    }

    pub fn has_more(&self) -> bool {
        (self.page as u64) * (self.per_page as u64) < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(id: &str) -> Template {
        Template {
            id: id.into(),
            name: format!("Template {id}"),
            preview_url: format!("/t/{id}.png"),
            color_variants: vec![ColorVariant {
                id: "navy".into(),
                color_hex: "#001f3f".into(),
                color_name: "Navy".into(),
                preview_url: format!("/t/{id}-navy.png"),
            }],
            base_price: 9.5,
        }
    }

    #[test]
    fn test_preview_for_variant() {
        let t = template("a");
        assert_eq!(t.preview_for(None), Some("/t/a.png"));
        assert_eq!(t.preview_for(Some("navy")), Some("/t/a-navy.png"));
        assert_eq!(t.preview_for(Some("red")), None);
    }

    #[test]
    fn test_paginate() {
        let all: Vec<_> = (0..5).map(|i| template(&i.to_string())).collect();
        let query = TemplateQuery {
            page: 2,
            per_page: 2,
            product_id: None,
        };
        let page = TemplatePage::paginate(&all, &query);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, "2");
        assert_eq!(page.total, 5);
        assert!(page.has_more());

        let last = TemplatePage::paginate(&all, &TemplateQuery { page: 3, ..query });
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more());
    }
}
