//! Decoding of heterogeneous module item payloads

use crate::module::error::ModuleError;
use crate::module::registry::{EntityTypeInfo, ItemTypeRegistry, DTO_SUFFIX};
use crate::types::{
    DatePeriod, ModuleDto, ModuleItem, ModuleItemDto, CUSTOM_ACTION_ITEM_TYPE,
    FIELD_TEMPLATE_ITEM_TYPE, MODULE_ITEM_TYPE,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Entity carried by an item payload, with the keys read from it
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPayload {
    pub code: String,
    pub applies_to: Option<String>,
    pub validity: Option<DatePeriod>,
    pub data: Value,
}

/// A module item payload resolved to the handler that installs it
#[derive(Debug, Clone)]
pub enum ItemPayload {
    /// Nested sub-module, installed recursively
    Module(Box<ModuleDto>),
    FieldTemplate(EntityPayload),
    CustomAction(EntityPayload),
    Entity {
        info: EntityTypeInfo,
        payload: EntityPayload,
    },
}

impl ItemPayload {
    /// Resolve `item` by its payload type name.
    pub fn decode(item: &ModuleItemDto, registry: &ItemTypeRegistry) -> Result<Self, ModuleError> {
        let simple_name = item.simple_name();
        let dedicated = |entity: &str| simple_name == format!("{entity}{DTO_SUFFIX}");

        if dedicated(MODULE_ITEM_TYPE) {
            let dto: ModuleDto = serde_json::from_value(item.dto_data.clone())?;
            return Ok(ItemPayload::Module(Box::new(dto)));
        }
        if dedicated(FIELD_TEMPLATE_ITEM_TYPE) {
            return Ok(ItemPayload::FieldTemplate(EntityPayload::read(item, false)?));
        }
        if dedicated(CUSTOM_ACTION_ITEM_TYPE) {
            return Ok(ItemPayload::CustomAction(EntityPayload::read(item, false)?));
        }

        let info = registry.resolve_dto(simple_name)?.clone();
        let payload = EntityPayload::read(item, true)?;
        Ok(ItemPayload::Entity { info, payload })
    }
}

impl EntityPayload {
    fn read(item: &ModuleItemDto, with_validity: bool) -> Result<Self, ModuleError> {
        let data = &item.dto_data;
        let code = data
            .get("code")
            .and_then(Value::as_str)
            .filter(|code| !code.trim().is_empty())
            .ok_or_else(|| ModuleError::InvalidItem {
                dto_class: item.dto_class_name.clone(),
                reason: "missing code".to_string(),
            })?
            .to_string();
        let applies_to = data
            .get("appliesTo")
            .and_then(Value::as_str)
            .map(str::to_string);

        // Validity is only read when the payload declares `validFrom`.
        let validity = match data.get("validFrom") {
            Some(from) if with_validity => Some(DatePeriod::new(
                parse_date(item, from)?,
                parse_date(item, data.get("validTo").unwrap_or(&Value::Null))?,
            )),
            _ => None,
        };

        Ok(Self {
            code,
            applies_to,
            validity,
            data: data.clone(),
        })
    }

    pub fn to_item(&self, item_type: &str) -> ModuleItem {
        ModuleItem::new(
            self.code.clone(),
            item_type,
            self.applies_to.clone(),
            self.validity.clone(),
        )
    }

    /// Codes of the field templates nested in the payload's `fields`
    pub fn nested_field_codes(&self) -> Vec<String> {
        let codes = |fields: Vec<&Value>| -> Vec<String> {
            fields
                .into_iter()
                .filter_map(|field| field.get("code").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        };
        match self.data.get("fields") {
            Some(Value::Array(fields)) => codes(fields.iter().collect()),
            Some(Value::Object(fields)) => codes(fields.values().collect()),
            _ => Vec::new(),
        }
    }

    /// Items recording the nested field templates under `<prefix>_<code>`
    pub fn nested_field_items(&self, prefix: &str) -> Vec<ModuleItem> {
        let scope = format!("{}_{}", prefix, self.code);
        self.nested_field_codes()
            .into_iter()
            .map(|code| ModuleItem::new(code, FIELD_TEMPLATE_ITEM_TYPE, Some(scope.clone()), None))
            .collect()
    }
}

/// Accepts RFC 3339 strings, epoch milliseconds or null.
fn parse_date(item: &ModuleItemDto, value: &Value) -> Result<Option<DateTime<Utc>>, ModuleError> {
    let invalid = |reason: String| ModuleError::InvalidItem {
        dto_class: item.dto_class_name.clone(),
        reason,
    };
    match value {
        Value::Null => Ok(None),
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|date| Some(date.with_timezone(&Utc)))
            .map_err(|e| invalid(format!("invalid date {text}: {e}"))),
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .map(Some)
            .ok_or_else(|| invalid(format!("invalid timestamp {number}"))),
        other => Err(invalid(format!("invalid date {other}"))),
    }
}

/// Rebuild an item payload from a stored entity.
pub fn entity_to_item(entity_type: &str, data: Value) -> ModuleItemDto {
    ModuleItemDto::new(format!("{entity_type}{DTO_SUFFIX}"), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::registry::{EntityTypeInfo, ENTITY_TEMPLATE_FIELD_PREFIX};
    use serde_json::json;

    fn registry() -> ItemTypeRegistry {
        let mut registry = ItemTypeRegistry::with_builtin_types();
        registry.register(EntityTypeInfo::versioned("PricePlan", "priceplan"));
        registry
    }

    #[test]
    fn test_nested_module_is_decoded() {
        let item = ModuleItemDto::new(
            "org.example.ModuleDto",
            json!({"code": "M2", "description": "d", "license": "l"}),
        );
        match ItemPayload::decode(&item, &registry()).unwrap() {
            ItemPayload::Module(dto) => assert_eq!(dto.code, "M2"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_validity_read_only_when_valid_from_present() {
        let with = ModuleItemDto::new(
            "PricePlanDto",
            json!({"code": "pp", "validFrom": "2024-01-01T00:00:00Z", "validTo": null}),
        );
        let without = ModuleItemDto::new("PricePlanDto", json!({"code": "pp", "validTo": 0}));

        let ItemPayload::Entity { payload, .. } = ItemPayload::decode(&with, &registry()).unwrap()
        else {
            panic!("expected entity payload");
        };
        let validity = payload.validity.unwrap();
        assert!(validity.from.is_some());
        assert!(validity.to.is_none());

        let ItemPayload::Entity { payload, .. } =
            ItemPayload::decode(&without, &registry()).unwrap()
        else {
            panic!("expected entity payload");
        };
        assert!(payload.validity.is_none());
    }

    #[test]
    fn test_field_template_keeps_scope() {
        let item = ModuleItemDto::new(
            "CustomFieldTemplateDto",
            json!({"code": "amount", "appliesTo": "CE_order"}),
        );
        let ItemPayload::FieldTemplate(payload) = ItemPayload::decode(&item, &registry()).unwrap()
        else {
            panic!("expected field template");
        };
        let module_item = payload.to_item(FIELD_TEMPLATE_ITEM_TYPE);
        assert_eq!(module_item.applies_to.as_deref(), Some("CE_order"));
    }

    #[test]
    fn test_entity_template_fields_become_scoped_items() {
        let item = ModuleItemDto::new(
            "CustomEntityTemplateDto",
            json!({"code": "order", "fields": [{"code": "amount"}, {"code": "date"}]}),
        );
        let ItemPayload::Entity { info, payload } =
            ItemPayload::decode(&item, &registry()).unwrap()
        else {
            panic!("expected entity payload");
        };
        assert_eq!(info.nested_field_prefix.as_deref(), Some(ENTITY_TEMPLATE_FIELD_PREFIX));

        let items = payload.nested_field_items(ENTITY_TEMPLATE_FIELD_PREFIX);
        assert_eq!(items.len(), 2);
        assert!(items
            .iter()
            .all(|item| item.applies_to.as_deref() == Some("CE_order")));
    }

    #[test]
    fn test_missing_code_is_rejected() {
        let item = ModuleItemDto::new("PricePlanDto", json!({"description": "x"}));
        let err = ItemPayload::decode(&item, &registry()).unwrap_err();
        assert!(matches!(err, ModuleError::InvalidItem { .. }));
    }
}
