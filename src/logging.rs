// The crate never installs a logger; all output goes through the `log` facade.

macro_rules! infoheader {
	($str:expr) => {{
		info!("");
		info!("{:=^70}", $str);
	}};
}

macro_rules! infoentry {
	($str:expr, $rhs:expr) => (infoentry!($str, "{}", $rhs));
	($str:expr, $($arg:tt)+) => (info!("{:25}{}", concat!($str, ":"), format_args!($($arg)+)));
}

macro_rules! infofooter {
	() => {{
		info!("{:=^70}", '=');
		info!("");
	}};
}
