use clap::Parser;
use rustdis::config::Config;
use rustdis::{server, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::parse();

    server::run(config).await
}
