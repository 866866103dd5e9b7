use std::{net::SocketAddr, sync::Arc};

use leaf_classifier_service::{
    config::Config,
    model::{self, Classifier},
    router,
    store::{self, PredictionStore},
    utils::ensure_model_exists,
    AppContext,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let store = connect_store(&config).await;
    let classifier = load_classifier(&config).await;

    let app = router(AppContext::new(classifier, store), config.body_limit_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

async fn connect_store(config: &Config) -> Option<Arc<dyn PredictionStore>> {
    match store::connect(&config.db).await {
        Ok(store) => {
            tracing::info!(driver = ?config.db.driver, "Database connection established");
            Some(store)
        }
        Err(err) => {
            tracing::error!(driver = ?config.db.driver, "Database connection failed: {}", err);
            None
        }
    }
}

async fn load_classifier(config: &Config) -> Option<Arc<dyn Classifier>> {
    if let Err(err) = ensure_model_exists(&config.model.path, config.model.url.as_deref()).await {
        tracing::error!("Could not fetch model artifact: {}", err);
    }

    let model_config = config.model.clone();
    let loaded = tokio::task::spawn_blocking(move || model::load_classifier(&model_config)).await;
    match loaded {
        Ok(Ok(classifier)) => {
            tracing::info!("Model loaded from {}", config.model.path.display());
            Some(classifier)
        }
        Ok(Err(err)) => {
            tracing::error!("Failed to load model from {}: {}", config.model.path.display(), err);
            None
        }
        Err(err) => {
            tracing::error!("Model loading task failed: {}", err);
            None
        }
    }
}
