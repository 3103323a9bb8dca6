/// tiny module to configure logging and save solution trajectories into file
pub mod logger;
