use axum::response::Html;

/// Landing page
pub async fn index_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Drishti</title>
    <meta charset="utf-8">
</head>
<body>
    <h1>Drishti relay</h1>
    <p>Join a room over <code>/ws</code> to receive <code>addRecognize</code> events.</p>
    <ul>
        <li><a href="/health">/health</a></li>
        <li><a href="/assets/">/assets</a></li>
        <li><a href="/static/">/static</a></li>
    </ul>
</body>
</html>
"#,
    )
}
