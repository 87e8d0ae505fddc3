//! One-shot cart commands.
//!
//! Each command loads the cart, performs at most one mutation and prints the
//! resulting surfaces. A failed mutation exits non-zero.

use modmarket_cart::surfaces::DrawerHandle;
use modmarket_cart::{CartEngine, CartError, MutationOutcome};
use modmarket_core::ModId;

use super::CommandError;
use super::render::Surfaces;

/// Print the cart with the drawer open.
pub async fn show(engine: &CartEngine) -> Result<(), CommandError> {
    if load(engine).await? {
        print(engine);
    }
    Ok(())
}

pub async fn add(engine: &CartEngine, mod_id: ModId) -> Result<(), CommandError> {
    if load(engine).await? {
        report(&engine.add(mod_id).await?);
        print(engine);
    }
    Ok(())
}

pub async fn remove(engine: &CartEngine, mod_id: ModId) -> Result<(), CommandError> {
    if load(engine).await? {
        report(&engine.remove(mod_id).await?);
        print(engine);
    }
    Ok(())
}

pub async fn clear(engine: &CartEngine) -> Result<(), CommandError> {
    if load(engine).await? {
        report(&engine.clear().await?);
        print(engine);
    }
    Ok(())
}

/// Fetch the cart. Returns `false` after printing the sign-in prompt for an
/// anonymous identity.
async fn load(engine: &CartEngine) -> Result<bool, CommandError> {
    match engine.refresh().await {
        Ok(_) => Ok(true),
        Err(CartError::Unauthenticated) => {
            print(engine);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn report(outcome: &MutationOutcome) {
    if !outcome.was_applied() {
        println!("Nothing to change.");
    }
}

fn print(engine: &CartEngine) {
    let handle = DrawerHandle::new();
    handle.open();
    println!("{}", Surfaces::new(engine, &handle).render());
}
