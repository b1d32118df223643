pub(crate) mod dao;
pub(crate) mod models;
