use serde::Serialize;
use serde_json::Value;

/// A courier company offered by the aggregator for a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourierOption {
    /// Primary id: `id`, else `courier_company_id`, else `courier_id`.
    pub id: String,
    pub name: Option<String>,
    #[serde(skip)]
    aliases: Vec<String>,
}

fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl CourierOption {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        let id = id.into();
        Self { aliases: vec![id.clone()], id, name }
    }

    pub(crate) fn from_value(v: &Value) -> Option<Self> {
        let aliases: Vec<String> = ["id", "courier_company_id", "courier_id"]
            .iter()
            .filter_map(|k| v.get(*k).and_then(text))
            .collect();
        let id = aliases.first()?.clone();
        let name = ["name", "courier_name"].iter().find_map(|k| v.get(*k).and_then(text));
        Some(Self { id, name, aliases })
    }

    /// Whether `wanted` names this courier under any of its ids.
    pub fn matches(&self, wanted: &str) -> bool {
        let wanted = wanted.trim();
        self.aliases.iter().any(|a| a == wanted)
    }
}

/// The preferred courier if it is serviceable, else the first one offered.
pub fn choose_courier<'a>(
    options: &'a [CourierOption],
    preferred: Option<&str>,
) -> Option<&'a CourierOption> {
    preferred
        .filter(|p| !p.trim().is_empty())
        .and_then(|p| options.iter().find(|c| c.matches(p)))
        .or_else(|| options.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> Vec<CourierOption> {
        crate::extract::courier_options(&json!({"data": {"available_courier_companies": [
            {"courier_company_id": 10, "courier_name": "Bluedart"},
            {"courier_company_id": 24, "courier_name": "Delhivery"},
        ]}}))
    }

    #[test]
    fn preferred_courier_wins_when_serviceable() {
        let opts = options();
        let chosen = choose_courier(&opts, Some("24")).unwrap();
        assert_eq!(chosen.name.as_deref(), Some("Delhivery"));
    }

    #[test]
    fn falls_back_to_first_serviceable() {
        let opts = options();
        assert_eq!(choose_courier(&opts, Some("99")).unwrap().id, "10");
        assert_eq!(choose_courier(&opts, None).unwrap().id, "10");
        assert_eq!(choose_courier(&opts, Some(" ")).unwrap().id, "10");
    }

    #[test]
    fn no_options_no_choice() {
        assert!(choose_courier(&[], Some("10")).is_none());
    }

    #[test]
    fn matches_any_id_alias() {
        let opt = CourierOption::from_value(&json!({"id": 1, "courier_id": "7"})).unwrap();
        assert_eq!(opt.id, "1");
        assert!(opt.matches("7"));
        assert!(opt.matches("1"));
        assert!(!opt.matches("2"));
        assert!(CourierOption::from_value(&json!({"name": "nameless"})).is_none());
    }
}
