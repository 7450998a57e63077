//! Domain types shared across the Weft workspace.

mod money;
mod numbering;
mod party;
mod payment;
mod product;

pub use money::{parse_amount, round_money, MONEY_SCALE};
pub use numbering::DocumentSeries;
pub use party::{Party, PartyDraft, PartyId, PartyKind};
pub use payment::{PaymentDirection, PaymentMethod};
pub use product::{Product, ProductDraft, ProductId, StockDirection};
