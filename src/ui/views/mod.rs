pub mod cache_panel;
pub mod catalog_list;
