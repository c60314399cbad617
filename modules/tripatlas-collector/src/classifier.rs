//! Classifies parsed records and maps them onto destination rows.

use serde_json::{json, Map, Value};

use tripatlas_common::{
    CityOverviewUpsert, DataType, NewAttraction, NewHotel, NewRecord, NewRestaurant, RecordKind,
};
use tripatlas_store::CommitRecord;

/// First matching rule wins: attraction markers, then restaurant markers,
/// then hotel markers. Everything else is an attraction so no record is
/// silently dropped.
pub fn classify(record: &Value) -> RecordKind {
    if has_attraction_markers(record) {
        return RecordKind::Attraction;
    }
    let category = category_of(record);
    if record.get("cuisine").is_some()
        || record.get("specialties").is_some()
        || category.contains('餐')
    {
        return RecordKind::Restaurant;
    }
    if record.get("starRating").is_some()
        || record.get("amenities").is_some()
        || category.contains("酒店")
    {
        return RecordKind::Hotel;
    }
    RecordKind::Attraction
}

fn has_attraction_markers(record: &Value) -> bool {
    let category = category_of(record);
    category.contains("景点") || category.contains("景区") || record.get("ticketPrice").is_some()
}

fn category_of(record: &Value) -> &str {
    record.get("category").and_then(Value::as_str).unwrap_or("")
}

/// Map a parsed record onto a destination row for its kind, applying
/// defensive defaults so a partially-populated upstream record still
/// produces a valid row.
pub fn build_new_record(record: &Value, kind: RecordKind) -> NewRecord {
    let name_zh = string_of(record, &["name", "nameZh"]).unwrap_or_else(|| "未命名".to_string());
    let name_en = string_of(record, &["nameEn", "englishName"]).unwrap_or_else(|| name_zh.clone());
    let description_zh =
        string_of(record, &["description", "introduction"]).unwrap_or_default();
    let description_en =
        string_of(record, &["descriptionEn"]).unwrap_or_else(|| description_zh.clone());
    let image_url = string_of(record, &["imageUrl", "image"]);
    let address = string_of(record, &["address"]);

    match kind {
        RecordKind::Attraction => {
            // Records routed here by explicit markers get a concrete price
            // (unparseable collapses to 0); default-routed ones stay null.
            let ticket_price = if has_attraction_markers(record) {
                Some(scrub_price(record.get("ticketPrice")).unwrap_or(0.0))
            } else {
                None
            };
            NewRecord::Attraction(NewAttraction {
                name_zh,
                name_en,
                description_zh,
                description_en,
                image_url,
                address,
                ticket_price,
                opening_hours: string_of(record, &["openingHours"]),
                category: string_of(record, &["category"]),
            })
        }
        RecordKind::Restaurant => NewRecord::Restaurant(NewRestaurant {
            name_zh,
            name_en,
            description_zh,
            description_en,
            image_url,
            address,
            cuisine: string_of(record, &["cuisine"]),
            specialties: record.get("specialties").cloned(),
            price_range: string_of(record, &["priceRange"]),
        }),
        RecordKind::Hotel => NewRecord::Hotel(NewHotel {
            name_zh,
            name_en,
            description_zh,
            description_en,
            image_url,
            address,
            star_rating: star_rating_of(record),
            amenities: record.get("amenities").cloned(),
            price_per_night: scrub_price(record.get("pricePerNight")),
        }),
    }
}

/// City overview payloads keep everything except the routing keys as
/// sections; picture lists come from the record or default to empty.
pub fn build_overview(record: &Value) -> CityOverviewUpsert {
    let mut sections = Map::new();
    if let Value::Object(obj) = record {
        for (key, value) in obj {
            if key != "city" && key != "pictures" && key != "pictureAdvises" {
                sections.insert(key.clone(), value.clone());
            }
        }
    }
    CityOverviewUpsert {
        sections: Value::Object(sections),
        pictures: record.get("pictures").cloned().unwrap_or_else(|| json!([])),
        picture_advises: record
            .get("pictureAdvises")
            .cloned()
            .unwrap_or_else(|| json!([])),
    }
}

/// What an approval of this payload commits. Record kinds are re-derived
/// from the effective payload so reviewer edits can change the routing.
pub fn commit_for(data_type: DataType, payload: &Value) -> CommitRecord {
    match data_type {
        DataType::CityOverview => CommitRecord::Overview(build_overview(payload)),
        DataType::Attraction | DataType::Restaurant | DataType::Hotel => {
            let kind = classify(payload);
            CommitRecord::Record(build_new_record(payload, kind))
        }
    }
}

/// Strip a price down to digits and dot before parsing. `¥128/人` → 128.
pub fn scrub_price(value: Option<&Value>) -> Option<f64> {
    let raw = match value? {
        Value::Number(n) => return n.as_f64(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().ok()
}

fn string_of(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        record
            .get(*key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.is_empty())
    })
}

fn star_rating_of(record: &Value) -> Option<i32> {
    match record.get("starRating")? {
        Value::Number(n) => n.as_i64().map(|v| v as i32),
        Value::String(s) => s
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ticket_price_forces_attraction_over_later_rules() {
        let record = json!({"ticketPrice": "¥40", "cuisine": "川菜", "starRating": 5});
        assert_eq!(classify(&record), RecordKind::Attraction);
    }

    #[test]
    fn cuisine_beats_star_rating() {
        let record = json!({"cuisine": "川菜", "starRating": 5});
        assert_eq!(classify(&record), RecordKind::Restaurant);
    }

    #[test]
    fn category_keywords_route_each_kind() {
        assert_eq!(classify(&json!({"category": "自然景区"})), RecordKind::Attraction);
        assert_eq!(classify(&json!({"category": "火锅餐厅"})), RecordKind::Restaurant);
        assert_eq!(classify(&json!({"category": "精品酒店"})), RecordKind::Hotel);
    }

    #[test]
    fn amenities_alone_route_hotel() {
        assert_eq!(
            classify(&json!({"amenities": ["wifi", "pool"]})),
            RecordKind::Hotel
        );
    }

    #[test]
    fn unmarked_record_defaults_to_attraction_with_null_price() {
        let record = json!({"name": "神秘地点"});
        assert_eq!(classify(&record), RecordKind::Attraction);

        let NewRecord::Attraction(a) = build_new_record(&record, RecordKind::Attraction) else {
            panic!("expected attraction");
        };
        assert_eq!(a.ticket_price, None);
        assert_eq!(a.name_zh, "神秘地点");
        assert_eq!(a.name_en, "神秘地点");
    }

    #[test]
    fn explicit_attraction_with_unparseable_price_gets_zero() {
        let record = json!({"category": "景点", "ticketPrice": "免费"});
        let NewRecord::Attraction(a) = build_new_record(&record, RecordKind::Attraction) else {
            panic!("expected attraction");
        };
        assert_eq!(a.ticket_price, Some(0.0));
    }

    #[test]
    fn price_scrub_keeps_digits_and_dot() {
        assert_eq!(scrub_price(Some(&json!("¥128.5/人"))), Some(128.5));
        assert_eq!(scrub_price(Some(&json!(99))), Some(99.0));
        assert_eq!(scrub_price(Some(&json!("免费"))), None);
        assert_eq!(scrub_price(None), None);
    }

    #[test]
    fn missing_names_fall_back_to_placeholders() {
        let NewRecord::Restaurant(r) =
            build_new_record(&json!({"cuisine": "粤菜"}), RecordKind::Restaurant)
        else {
            panic!("expected restaurant");
        };
        assert_eq!(r.name_zh, "未命名");
        assert_eq!(r.name_en, "未命名");
        assert_eq!(r.cuisine.as_deref(), Some("粤菜"));
    }

    #[test]
    fn hotel_fields_map_from_camel_case_keys() {
        let record = json!({
            "name": "湖畔酒店",
            "nameEn": "Lakeside Hotel",
            "starRating": "5星",
            "amenities": ["spa"],
            "pricePerNight": "¥880起"
        });
        let NewRecord::Hotel(h) = build_new_record(&record, RecordKind::Hotel) else {
            panic!("expected hotel");
        };
        assert_eq!(h.name_en, "Lakeside Hotel");
        assert_eq!(h.star_rating, Some(5));
        assert_eq!(h.price_per_night, Some(880.0));
        assert_eq!(h.amenities, Some(json!(["spa"])));
    }

    #[test]
    fn overview_moves_routing_keys_out_of_sections() {
        let record = json!({
            "city": "Testville",
            "history": {"content": "H"},
            "pictures": ["a.jpg"],
            "pictureAdvises": ["use a.jpg"]
        });
        let overview = build_overview(&record);
        assert_eq!(overview.sections, json!({"history": {"content": "H"}}));
        assert_eq!(overview.pictures, json!(["a.jpg"]));
        assert_eq!(overview.picture_advises, json!(["use a.jpg"]));
    }

    #[test]
    fn commit_for_overview_builds_an_upsert() {
        let commit = commit_for(DataType::CityOverview, &json!({"city": "X", "food": {}}));
        assert!(matches!(commit, CommitRecord::Overview(_)));
    }
}
