pub(crate) mod movie;
pub(crate) mod tools;
