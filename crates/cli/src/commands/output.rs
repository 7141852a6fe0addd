//! Plain-text rendering of command results on stdout.

#![allow(clippy::print_stdout)]

use fads_core::{Actor, Cart};
use fads_storefront::Decision;

pub fn actor(actor: &Actor) {
    match actor {
        Actor::Guest => println!("guest"),
        Actor::Customer { id, email } | Actor::Admin { id, email } => {
            println!("{} {email} (id {id})", actor.kind());
        }
    }
}

pub fn decision(path: &str, decision: &Decision) {
    println!("{path}: {decision}");
}

pub fn cart(cart: &Cart) {
    if cart.is_empty() {
        println!("cart is empty");
        return;
    }
    for line in cart.lines() {
        println!(
            "{:<32} {:>5} x {:>10} = {:>10}",
            line.key(),
            line.quantity(),
            line.unit_price(),
            line.subtotal()
        );
    }
    println!(
        "{} lines, {} items, total {}",
        cart.count(),
        cart.item_count(),
        cart.total()
    );
}
