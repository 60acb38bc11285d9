use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Item type name recorded for nested sub-modules.
pub const MODULE_ITEM_TYPE: &str = "Module";

/// Item type name of field templates, both first-class and nested.
pub const FIELD_TEMPLATE_ITEM_TYPE: &str = "CustomFieldTemplate";

/// Item type name of entity custom actions.
pub const CUSTOM_ACTION_ITEM_TYPE: &str = "EntityCustomAction";

/// Validity window of a versioned module item.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatePeriod {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DatePeriod {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }
}

/// Reference from a module to one persisted business entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleItem {
    pub item_code: String,
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<DatePeriod>,
}

impl ModuleItem {
    pub fn new(
        item_code: impl Into<String>,
        item_type: impl Into<String>,
        applies_to: Option<String>,
        validity: Option<DatePeriod>,
    ) -> Self {
        Self {
            item_code: item_code.into(),
            item_type: item_type.into(),
            applies_to,
            validity,
        }
    }

    pub fn is_module(&self) -> bool {
        self.item_type == MODULE_ITEM_TYPE
    }
}

// Identity ignores validity so that add/remove match on code, type and scope.
impl PartialEq for ModuleItem {
    fn eq(&self, other: &Self) -> bool {
        self.item_code == other.item_code
            && self.item_type == other.item_type
            && self.applies_to == other.applies_to
    }
}

impl Eq for ModuleItem {}

/// Persisted module record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    pub code: String,
    pub description: String,
    pub license: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_code: Option<String>,
    #[serde(default)]
    pub items: Vec<ModuleItem>,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub active: bool,
    /// Serialized payload kept so the module can be reinstalled later.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_source: Option<String>,
}

impl ModuleManifest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: String::new(),
            license: String::new(),
            logo_picture: None,
            script_code: None,
            items: Vec::new(),
            installed: false,
            active: false,
            module_source: None,
        }
    }

    /// A module obtained from an external source keeps its payload snapshot.
    /// Modules without one are under local development.
    pub fn is_downloaded(&self) -> bool {
        self.module_source
            .as_deref()
            .is_some_and(|source| !source.trim().is_empty())
    }

    pub fn add_item(&mut self, item: ModuleItem) {
        if !self.items.contains(&item) {
            self.items.push(item);
        }
    }

    pub fn remove_item(&mut self, item: &ModuleItem) -> bool {
        let before = self.items.len();
        self.items.retain(|existing| existing != item);
        before != self.items.len()
    }

    pub fn contains_item(&self, item_code: &str, item_type: &str) -> bool {
        self.items
            .iter()
            .any(|item| item.item_code == item_code && item.item_type == item_type)
    }
}

/// Script reference embedded in a module payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl ScriptDto {
    pub fn by_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            script: None,
            active: true,
        }
    }

    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            code: None,
            script: Some(source.into()),
            active: true,
        }
    }

    /// True when only a reference to an existing script is carried.
    pub fn is_code_only(&self) -> bool {
        is_blank(self.script.as_deref())
    }
}

/// One heterogeneous entry of a module payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleItemDto {
    pub dto_class_name: String,
    #[serde(default)]
    pub dto_data: serde_json::Value,
}

impl ModuleItemDto {
    pub fn new(dto_class_name: impl Into<String>, dto_data: serde_json::Value) -> Self {
        Self {
            dto_class_name: dto_class_name.into(),
            dto_data,
        }
    }

    /// Type name without any namespace qualification.
    pub fn simple_name(&self) -> &str {
        self.dto_class_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.dto_class_name)
    }
}

/// Module payload as received for creation or installation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDto {
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_code: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub license: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_picture: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes"
    )]
    pub logo_picture_file: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_items: Option<Vec<ModuleItemDto>>,
}

impl ModuleDto {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        license: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            license: license.into(),
            ..Default::default()
        }
    }

    pub fn with_items(mut self, items: Vec<ModuleItemDto>) -> Self {
        self.module_items = Some(items);
        self
    }

    pub fn with_script(mut self, script: ScriptDto) -> Self {
        self.script = Some(script);
        self
    }

    pub fn add_item(&mut self, item: ModuleItemDto) {
        self.module_items.get_or_insert_with(Vec::new).push(item);
    }
}

/// Filters accepted when listing modules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFilter {
    /// Short module item type tag, resolved to `item_class` before querying.
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub item_class: Option<String>,
    #[serde(default)]
    pub item_code: Option<String>,
    #[serde(default)]
    pub installed: Option<bool>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub downloaded: Option<bool>,
}

impl ModuleFilter {
    pub fn matches(&self, module: &ModuleManifest) -> bool {
        if let Some(installed) = self.installed {
            if module.installed != installed {
                return false;
            }
        }
        if let Some(active) = self.active {
            if module.active != active {
                return false;
            }
        }
        if let Some(downloaded) = self.downloaded {
            if module.is_downloaded() != downloaded {
                return false;
            }
        }
        match (&self.item_class, &self.item_code) {
            (Some(class), Some(code)) => module.contains_item(code, class),
            (Some(class), None) => module.items.iter().any(|item| &item.item_type == class),
            (None, Some(code)) => module.items.iter().any(|item| &item.item_code == code),
            (None, None) => true,
        }
    }
}

pub(crate) fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_downloaded_requires_snapshot() {
        let mut module = ModuleManifest::new("M1");
        assert!(!module.is_downloaded());

        module.module_source = Some("   ".to_string());
        assert!(!module.is_downloaded());

        module.module_source = Some("{\"code\":\"M1\"}".to_string());
        assert!(module.is_downloaded());
    }

    #[test]
    fn test_item_identity_ignores_validity() {
        let mut module = ModuleManifest::new("M1");
        module.add_item(ModuleItem::new("price", "PricePlan", None, None));
        module.add_item(ModuleItem::new(
            "price",
            "PricePlan",
            None,
            Some(DatePeriod::default()),
        ));
        assert_eq!(module.items.len(), 1);

        assert!(module.remove_item(&ModuleItem::new("price", "PricePlan", None, None)));
        assert!(module.items.is_empty());
    }

    #[test]
    fn test_simple_name_strips_namespace() {
        let item = ModuleItemDto::new("org.example.dto.ServiceTemplateDto", json!({}));
        assert_eq!(item.simple_name(), "ServiceTemplateDto");

        let bare = ModuleItemDto::new("ModuleDto", json!({}));
        assert_eq!(bare.simple_name(), "ModuleDto");
    }

    #[test]
    fn test_logo_picture_file_round_trips_as_base64() {
        let mut dto = ModuleDto::new("M1", "d", "l");
        dto.logo_picture_file = Some(vec![1, 2, 3]);

        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["logoPictureFile"], json!("AQID"));

        let back: ModuleDto = serde_json::from_value(json).unwrap();
        assert_eq!(back.logo_picture_file, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_filter_by_item_class_and_state() {
        let mut module = ModuleManifest::new("M1");
        module.installed = true;
        module.add_item(ModuleItem::new("cet", "CustomEntityTemplate", None, None));

        let filter = ModuleFilter {
            item_class: Some("CustomEntityTemplate".to_string()),
            installed: Some(true),
            ..Default::default()
        };
        assert!(filter.matches(&module));

        let other = ModuleFilter {
            item_class: Some("ServiceTemplate".to_string()),
            ..Default::default()
        };
        assert!(!other.matches(&module));
    }
}
