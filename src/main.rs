use std::env;

use btreekv::{Collection, Options, PageManager};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> btreekv::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "btreekv=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "mainTest.db".to_string());
    let key = args.next().unwrap_or_else(|| "Key1".to_string());

    let options = match env::var("BTREEKV_CONFIG") {
        Ok(config) => Options::load(config)?,
        Err(_) => Options::default(),
    };

    let mut store = PageManager::open(&path, options)?;
    {
        let mut collection = Collection::new("main", &mut store);
        match collection.find(key.as_bytes())? {
            Some(item) => println!(
                "key is: {}, value is: {}",
                String::from_utf8_lossy(&item.key),
                String::from_utf8_lossy(&item.value)
            ),
            None => println!("key {key} not found"),
        }
    }
    store.close()
}
