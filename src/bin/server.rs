use clap::Parser;
use streamdis::config::Config;
use streamdis::{server, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::parse();

    server::run(config).await
}
