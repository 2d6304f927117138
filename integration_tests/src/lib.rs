pub mod sim_link;
