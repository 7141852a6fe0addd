//! Guest cart commands.
//!
//! Every command loads the `guest_cart` snapshot from `FADS_STORAGE_DIR`,
//! applies one cart action and writes the result back, exactly as a guest
//! mutation in the storefront would.
//!
//! # Usage
//!
//! ```bash
//! fads cart add SKU-1 --size M --quantity 2 --price 19.99
//! fads cart update 'SKU-1|M|' 5
//! fads cart remove 'SKU-1|M|'
//! fads cart clear
//! ```

use std::str::FromStr;

use chrono::Utc;
use fads_core::{Cart, CartAction, LineKey, Price, ProductId, ValidationError, Variant};
use fads_storefront::StorefrontConfig;
use fads_storefront::storage::{FileStore, GuestCartRepository};
use rust_decimal::Decimal;

use super::{CliError, output};

fn repository(config: &StorefrontConfig) -> Result<GuestCartRepository, CliError> {
    Ok(GuestCartRepository::new(FileStore::open(
        &config.storage_dir,
    )?))
}

/// Apply `action` to the saved guest cart. Nothing is written if the action
/// is rejected.
fn apply(config: &StorefrontConfig, action: CartAction) -> Result<Cart, CliError> {
    let repo = repository(config)?;
    let cart = repo.load()?.reduce(action)?;
    repo.save(&cart)?;
    Ok(cart)
}

fn parse_price(raw: &str) -> Result<Price, CliError> {
    let amount = Decimal::from_str(raw.trim()).map_err(|_| CliError::InvalidPrice(raw.to_owned()))?;
    Ok(Price::new(amount).map_err(ValidationError::from)?)
}

pub fn show(config: &StorefrontConfig) -> Result<(), CliError> {
    output::cart(&repository(config)?.load()?);
    Ok(())
}

pub fn add(
    config: &StorefrontConfig,
    product_id: &str,
    size: Option<&str>,
    color: Option<&str>,
    quantity: i64,
    price: &str,
) -> Result<(), CliError> {
    let action = CartAction::Add {
        product_id: ProductId::parse(product_id).map_err(ValidationError::from)?,
        variant: Variant::new(size, color).map_err(ValidationError::from)?,
        quantity,
        unit_price: parse_price(price)?,
        at: Utc::now(),
    };
    let cart = apply(config, action)?;
    tracing::info!(product_id, quantity, "Added to guest cart");
    output::cart(&cart);
    Ok(())
}

pub fn update(config: &StorefrontConfig, line_key: &str, quantity: i64) -> Result<(), CliError> {
    let key = LineKey::parse(line_key)?;
    output::cart(&apply(config, CartAction::Update { key, quantity })?);
    Ok(())
}

pub fn remove(config: &StorefrontConfig, line_key: &str) -> Result<(), CliError> {
    let key = LineKey::parse(line_key)?;
    output::cart(&apply(config, CartAction::Remove { key })?);
    Ok(())
}

pub fn clear(config: &StorefrontConfig) -> Result<(), CliError> {
    repository(config)?.clear()?;
    tracing::info!("Guest cart cleared");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("19.99").unwrap().to_string(), "19.99");
        assert_eq!(parse_price(" 5 ").unwrap(), Price::whole(5));
        assert!(matches!(parse_price("abc"), Err(CliError::InvalidPrice(_))));
        assert!(matches!(
            parse_price("-1"),
            Err(CliError::Validation(ValidationError::Price(_)))
        ));
    }

    #[test]
    fn test_rejected_action_leaves_saved_cart() {
        let dir = std::env::temp_dir().join(format!("fads-cli-{}", std::process::id()));
        let mut config = StorefrontConfig::for_api("http://localhost:5000/api").unwrap();
        config.storage_dir = dir.clone();

        add(&config, "SKU-1", Some("M"), None, 2, "10").unwrap();
        assert!(add(&config, "SKU-1", Some("M"), None, 0, "10").is_err());

        let cart = repository(&config).unwrap().load().unwrap();
        assert_eq!(cart.item_count(), 2);

        clear(&config).unwrap();
        assert!(repository(&config).unwrap().load().unwrap().is_empty());
        std::fs::remove_dir_all(dir).unwrap();
    }
}
