pub mod keystore_ctl;
