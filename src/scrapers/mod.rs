pub mod immovlan;
