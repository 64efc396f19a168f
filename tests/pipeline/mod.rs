mod batch;
mod restart;
#[cfg(unix)]
mod script;
