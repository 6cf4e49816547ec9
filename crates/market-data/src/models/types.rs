use std::borrow::Cow;

/// Provider identifier - mostly static constants ("YAHOO", "EASTMONEY", ...)
pub type ProviderId = Cow<'static, str>;
