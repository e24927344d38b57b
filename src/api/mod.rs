pub mod balance;
pub mod leave_request;

#[cfg(test)]
pub mod testing;
