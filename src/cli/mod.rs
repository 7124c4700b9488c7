//! CLI command handlers

pub mod commands;

pub use commands::{
    add_image, add_product, add_project, add_skcs, add_user, archive_project, delete_image,
    delete_skcs, export, import, init, list_images, list_products, list_projects, list_skcs,
    open_store, set_primary_image, stats, update_status,
};
