use anyhow::Result;
use log::{info, warn};
use std::env;
use std::sync::Arc;

use torgibot::llm::{LanguageModel, VseGptClient};
use torgibot::search::SearchService;
use torgibot::settings::Settings;
use torgibot::store;

/// Run one natural-language search from the command line and print the
/// ranked results. The chat frontend wires the same service; this binary
/// exists for local runs and smoke checks.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    dotenv::dotenv().ok();

    let settings = Settings::from_env();

    let query: String = env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        eprintln!("Usage: torgibot <запрос>, например: torgibot ИЖС до 2 млн в Ступино");
        return Ok(());
    }

    info!("Opening database at {}", settings.database_path);
    let conn = store::open(&settings.database_path)?;
    store::init_schema(&conn)?;

    let llm: Option<Arc<dyn LanguageModel>> = match &settings.vsegpt_api_key {
        Some(key) => match VseGptClient::with_options(
            key,
            settings.vsegpt_model.as_deref(),
            settings.vsegpt_base_url.as_deref(),
        ) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("Language model client unavailable: {}", e);
                None
            }
        },
        None => {
            warn!("VSE_GPT_API_KEY not set, using keyword extraction only");
            None
        }
    };

    let service = SearchService::new(llm);
    let results = service.search_by_natural_language(&conn, &query).await?;

    if results.is_empty() {
        println!("По запросу «{}» ничего не найдено.", query);
        return Ok(());
    }

    println!("Найдено объектов: {}\n", results.len());
    for (i, listing) in results.iter().enumerate() {
        let area = if listing.total_square > 0.0 {
            format!("{:.0} м²", listing.total_square)
        } else {
            "площадь не указана".to_string()
        };
        println!(
            "{}. {}\n   {:.0} ₽ | {} | {}\n   {}\n",
            i + 1,
            listing.name,
            listing.start_price,
            area,
            listing.address_description.as_deref().unwrap_or("адрес не указан"),
            listing.link(),
        );
    }

    Ok(())
}
