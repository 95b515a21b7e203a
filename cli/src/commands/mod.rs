mod brew;
mod cache;
mod helpers;
mod ingredient;
mod reading;

pub(crate) use brew::{cmd_list, cmd_new, cmd_notes, cmd_show, cmd_toggle};
pub(crate) use cache::{cmd_cache_clear, cmd_cache_list};
pub(crate) use ingredient::{cmd_ingredient_add, cmd_ingredient_delete, cmd_ingredient_edit};
pub(crate) use reading::cmd_reading;
