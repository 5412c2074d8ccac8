//! Collections of the flower shop and the plan that creates them.

use crate::error::CoreResult;
use crate::migration::{EnsureCollections, MigrationPlan};
use crate::schema::{CollectionSchema, IndexSchema};

/// Default database name.
pub const DATABASE_NAME: &str = "flower_shop";

/// Product catalogue.
pub const PRODUCTS: &str = "products";
/// Per-user cart lines.
pub const CART: &str = "cart";
/// Per-user wishlist entries.
pub const WISHLIST: &str = "wishlist";
/// Orders.
pub const ORDERS: &str = "orders";
/// Blog comments.
pub const COMMENTS: &str = "comments";
/// Blog posts.
pub const BLOG_POSTS: &str = "blog_posts";
/// Uploaded images.
pub const IMAGES: &str = "images";
/// User accounts.
pub const USERS: &str = "users";

/// The shop's migration plan, one step per schema version:
///
/// | version | collections |
/// |---------|-------------|
/// | 1 | `products` (index `category`) |
/// | 2 | `cart`, `wishlist` (index `userId`) |
/// | 3 | `orders` (indexes `userId`, `status`) |
/// | 4 | `comments` (indexes `postId`, `userId`), `blog_posts` (index `status`) |
/// | 5 | `images` (index `type`) |
/// | 6 | `users` (unique index `email`) |
///
/// # Errors
///
/// Returns an error only if two steps share a version.
pub fn shop_plan() -> CoreResult<MigrationPlan> {
    let steps = [
        EnsureCollections::new(1, "catalogue")
            .with(CollectionSchema::new(PRODUCTS).with_index(IndexSchema::on("category"))),
        EnsureCollections::new(2, "cart_and_wishlist")
            .with(CollectionSchema::new(CART).with_index(IndexSchema::on("userId")))
            .with(CollectionSchema::new(WISHLIST).with_index(IndexSchema::on("userId"))),
        EnsureCollections::new(3, "orders").with(
            CollectionSchema::new(ORDERS)
                .with_index(IndexSchema::on("userId"))
                .with_index(IndexSchema::on("status")),
        ),
        EnsureCollections::new(4, "blog")
            .with(
                CollectionSchema::new(COMMENTS)
                    .with_index(IndexSchema::on("postId"))
                    .with_index(IndexSchema::on("userId")),
            )
            .with(CollectionSchema::new(BLOG_POSTS).with_index(IndexSchema::on("status"))),
        EnsureCollections::new(5, "images")
            .with(CollectionSchema::new(IMAGES).with_index(IndexSchema::on("type"))),
        EnsureCollections::new(6, "users")
            .with(CollectionSchema::new(USERS).with_index(IndexSchema::on("email").unique())),
    ];

    let mut plan = MigrationPlan::new();
    for step in steps {
        plan.register(Box::new(step))?;
    }
    Ok(plan)
}
