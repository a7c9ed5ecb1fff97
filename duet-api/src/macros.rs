/// Let handlers extract individual [`AppState`](crate::state::AppState)
/// fields with `State<T>`.
///
/// ```ignore
/// impl_from_ref! {
///     RefreshCoordinator => coordinator,
///     Arc<dyn SelectionStore> => selections,
/// }
/// ```
#[macro_export]
macro_rules! impl_from_ref {
    ($($type:ty => $field:ident),+ $(,)?) => {
        $(
            impl axum::extract::FromRef<$crate::state::AppState> for $type {
                fn from_ref(state: &$crate::state::AppState) -> Self {
                    state.$field.clone()
                }
            }
        )+
    };
}
