pub mod coupons;
pub mod product_variants;
pub mod products;
pub mod users;

pub use coupons::Entity as Coupons;
pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
pub use users::Entity as Users;
