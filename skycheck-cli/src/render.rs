use chrono::Local;
use skycheck_core::{SearchState, WeatherRecord};

/// Human-readable view of the current search state.
pub fn render(state: &SearchState) -> String {
    if state.is_loading {
        return format!("Loading weather for {}...", state.query.trim());
    }

    match (&state.weather, &state.last_error) {
        (Some(weather), _) => render_weather(weather),
        (None, Some(failure)) => format!("No weather available: {}", failure.message),
        (None, None) => "No weather available.".to_string(),
    }
}

fn render_weather(weather: &WeatherRecord) -> String {
    let mut out = format!(
        "{}\n  {:.0}°C  {}\n  Feels like {:.0}°",
        weather.city_name,
        weather.temperature_c,
        weather.description,
        weather.feels_like_c.unwrap_or(weather.temperature_c),
    );

    if let Some(humidity) = weather.humidity_pct {
        out.push_str(&format!("  ·  Humidity {humidity}%"));
    }
    if let Some(wind) = weather.wind_kph {
        out.push_str(&format!("  ·  Wind {wind:.1} km/h"));
    }
    if let Some(index) = weather.us_epa_index {
        out.push_str(&format!("\n  Air quality: {} (US EPA {index})", air_quality_label(index)));
    }
    if let Some(observed_at) = weather.observed_at {
        out.push_str(&format!("\n  Updated {}", observed_at.with_timezone(&Local).format("%H:%M")));
    }

    out
}

fn air_quality_label(us_epa_index: u8) -> &'static str {
    match us_epa_index {
        1 => "Good",
        2 => "Moderate",
        3 => "Unhealthy for sensitive groups",
        4 => "Unhealthy",
        5 => "Very unhealthy",
        6 => "Hazardous",
        _ => "Unknown",
    }
}
