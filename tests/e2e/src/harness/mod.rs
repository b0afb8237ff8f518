pub mod db_manager;
