use storefront_lib::config::Config;
use tracing::error;

#[tokio::main]
async fn main() {
    storefront_lib::init_tracing();

    let config = match Config::load(None) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = storefront_lib::run(config).await {
        error!(error = %e, "storefront stopped");
        std::process::exit(1);
    }
}
