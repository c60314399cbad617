//! Read-only browse endpoints over the committed destination tables.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use tripatlas_store::{AttractionRow, CityRow, HotelRow, RestaurantRow};

use super::{bad_request, error_response, not_found};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Zh,
    En,
}

impl Lang {
    /// `?lang=en` switches to English; everything else is Chinese.
    fn from_query(raw: Option<&str>) -> Lang {
        match raw {
            Some("en") => Lang::En,
            _ => Lang::Zh,
        }
    }
}

#[derive(Deserialize)]
pub struct LangQuery {
    lang: Option<String>,
}

/// English falls back to the Chinese column when the translation is empty.
fn pick<'a>(lang: Lang, zh: &'a str, en: &'a str) -> &'a str {
    match lang {
        Lang::En if !en.is_empty() => en,
        _ => zh,
    }
}

fn city_json(row: &CityRow, lang: Lang) -> Value {
    json!({
        "id": row.id,
        "name": pick(lang, &row.name_zh, &row.name_en),
        "description": pick(lang, &row.description_zh, &row.description_en),
        "image_url": row.image_url,
        "location": row.location,
        "created_at": row.created_at,
    })
}

fn attraction_json(row: &AttractionRow, lang: Lang) -> Value {
    json!({
        "id": row.id,
        "name": pick(lang, &row.name_zh, &row.name_en),
        "description": pick(lang, &row.description_zh, &row.description_en),
        "image_url": row.image_url,
        "address": row.address,
        "ticket_price": row.ticket_price,
        "opening_hours": row.opening_hours,
        "category": row.category,
    })
}

fn restaurant_json(row: &RestaurantRow, lang: Lang) -> Value {
    json!({
        "id": row.id,
        "name": pick(lang, &row.name_zh, &row.name_en),
        "description": pick(lang, &row.description_zh, &row.description_en),
        "image_url": row.image_url,
        "address": row.address,
        "cuisine": row.cuisine,
        "specialties": row.specialties,
        "price_range": row.price_range,
    })
}

fn hotel_json(row: &HotelRow, lang: Lang) -> Value {
    json!({
        "id": row.id,
        "name": pick(lang, &row.name_zh, &row.name_en),
        "description": pick(lang, &row.description_zh, &row.description_en),
        "image_url": row.image_url,
        "address": row.address,
        "star_rating": row.star_rating,
        "amenities": row.amenities,
        "price_per_night": row.price_per_night,
    })
}

pub async fn api_cities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LangQuery>,
) -> impl IntoResponse {
    let lang = Lang::from_query(params.lang.as_deref());
    match state.store.list_cities().await {
        Ok(cities) => {
            let items: Vec<Value> = cities.iter().map(|c| city_json(c, lang)).collect();
            Json(json!({"cities": items})).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn api_city(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<LangQuery>,
) -> impl IntoResponse {
    let Ok(city_id) = Uuid::parse_str(&id) else {
        return bad_request("invalid city id");
    };
    let lang = Lang::from_query(params.lang.as_deref());

    match state.store.get_city(city_id).await {
        Ok(Some(city)) => Json(json!({"city": city_json(&city, lang)})).into_response(),
        Ok(None) => not_found(format!("city {city_id}")),
        Err(e) => error_response(e),
    }
}

pub async fn api_city_attractions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<LangQuery>,
) -> impl IntoResponse {
    let Ok(city_id) = Uuid::parse_str(&id) else {
        return bad_request("invalid city id");
    };
    let lang = Lang::from_query(params.lang.as_deref());

    match require_city(&state, city_id).await {
        Ok(()) => {}
        Err(resp) => return resp,
    }
    match state.store.attractions_by_city(city_id).await {
        Ok(rows) => {
            let items: Vec<Value> = rows.iter().map(|r| attraction_json(r, lang)).collect();
            Json(json!({"attractions": items})).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn api_city_restaurants(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<LangQuery>,
) -> impl IntoResponse {
    let Ok(city_id) = Uuid::parse_str(&id) else {
        return bad_request("invalid city id");
    };
    let lang = Lang::from_query(params.lang.as_deref());

    match require_city(&state, city_id).await {
        Ok(()) => {}
        Err(resp) => return resp,
    }
    match state.store.restaurants_by_city(city_id).await {
        Ok(rows) => {
            let items: Vec<Value> = rows.iter().map(|r| restaurant_json(r, lang)).collect();
            Json(json!({"restaurants": items})).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn api_city_hotels(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<LangQuery>,
) -> impl IntoResponse {
    let Ok(city_id) = Uuid::parse_str(&id) else {
        return bad_request("invalid city id");
    };
    let lang = Lang::from_query(params.lang.as_deref());

    match require_city(&state, city_id).await {
        Ok(()) => {}
        Err(resp) => return resp,
    }
    match state.store.hotels_by_city(city_id).await {
        Ok(rows) => {
            let items: Vec<Value> = rows.iter().map(|r| hotel_json(r, lang)).collect();
            Json(json!({"hotels": items})).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Overview sections are served as stored; the payload itself is not
/// split by language.
pub async fn api_city_overview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Ok(city_id) = Uuid::parse_str(&id) else {
        return bad_request("invalid city id");
    };

    match require_city(&state, city_id).await {
        Ok(()) => {}
        Err(resp) => return resp,
    }
    match state.store.overview_by_city(city_id).await {
        Ok(Some(overview)) => Json(json!({"overview": overview})).into_response(),
        Ok(None) => not_found(format!("overview for city {city_id}")),
        Err(e) => error_response(e),
    }
}

async fn require_city(
    state: &AppState,
    city_id: Uuid,
) -> Result<(), axum::response::Response> {
    match state.store.get_city(city_id).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(not_found(format!("city {city_id}"))),
        Err(e) => Err(error_response(e)),
    }
}
