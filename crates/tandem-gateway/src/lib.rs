pub mod connection;
pub mod dispatcher;
pub mod fanout;
pub mod history;
pub mod location;
pub mod ordering;
pub mod presence;
pub mod relay;

#[cfg(test)]
mod test_support;
