pub type DieselError = diesel::result::Error;

pub type DbConn<'a> =
    diesel_async::pooled_connection::bb8::PooledConnection<'a, diesel_async::AsyncPgConnection>;
